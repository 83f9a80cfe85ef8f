use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use reqwatch_infra::TrackerConfig;

const ENV_JOBS: &str = "REQWATCH_JOBS";
const ENV_BLOCKS: &str = "REQWATCH_BLOCKS";

fn main() -> Result<()> {
    reqwatch_observability::init();

    let mut args = env::args().skip(1);
    let jobs_path = path_from(args.next(), ENV_JOBS)?;
    let blocks_path = path_from(args.next(), ENV_BLOCKS)?;

    let config = TrackerConfig::from_env().context("invalid tracker configuration")?;
    let (jobs, blocks) = reqwatch_replay::load(&jobs_path, &blocks_path)?;

    let summary = reqwatch_replay::replay(jobs, &blocks, config)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}

fn path_from(arg: Option<String>, env_key: &str) -> Result<PathBuf> {
    arg.or_else(|| env::var(env_key).ok())
        .map(PathBuf::from)
        .with_context(|| format!("missing path: pass it as an argument or set {env_key}"))
}
