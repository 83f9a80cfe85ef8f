use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use reqwatch_core::Interest;
use reqwatch_events::{BlockEvents, EventQuery, ProviderRequestRecord, RawEvent, match_requests};

/// A block with `records` provider records, one in four addressed to `p1/svcA`.
fn block(records: usize) -> BlockEvents {
    let mut events = Vec::with_capacity(records * 2);
    for i in 0..records {
        let (service, provider) = if i % 4 == 0 { ("svcA", "p1") } else { ("svcB", "p2") };
        let ids = format!(r#"["req-{i}-a","req-{i}-b","req-0-a"]"#);
        events.push(ProviderRequestRecord::to_raw(service, provider, &ids));
        events.push(RawEvent::new("transfer").with_attribute("amount", "10"));
    }
    BlockEvents::new(1, events)
}

fn bench_match_requests(c: &mut Criterion) {
    let interest = Interest::new("p1", "svcA").unwrap();
    let mut group = c.benchmark_group("match_requests");

    for records in [10usize, 100, 1_000] {
        let block = block(records);
        group.throughput(Throughput::Elements(records as u64));
        group.bench_with_input(BenchmarkId::from_parameter(records), &block, |b, block| {
            b.iter(|| match_requests(black_box(&block.events), black_box(&interest)))
        });
    }

    group.finish();
}

fn bench_query_filter(c: &mut Criterion) {
    let interest = Interest::new("p1", "svcA").unwrap();
    let query = EventQuery::for_interest(&interest);
    let block = block(1_000);

    c.bench_function("event_query_matches_1000", |b| b.iter(|| query.matches(black_box(&block))));
}

criterion_group!(benches, bench_match_requests, bench_query_filter);
criterion_main!(benches);
