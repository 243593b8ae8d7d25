mod common;

use std::collections::BTreeSet;

use strata_encoder::{EncodeError, EncoderConfig, MetricsProducer, PayloadType, StreamConsumer, TracesProducer};
use strata_model::{KeyValue, Resource, Scope};

use self::common::*;

fn distinct_u16(values: &[Option<u16>]) -> BTreeSet<u16> {
    values.iter().flatten().copied().collect()
}

fn no_dedup() -> EncoderConfig {
    EncoderConfig {
        dedup: false,
        ..Default::default()
    }
}

#[test]
fn dedup_writes_each_resource_once() {
    for (config, resources, attr_rows) in [(EncoderConfig::default(), 2, 4), (no_dedup(), 6, 12)] {
        let mut producer = TracesProducer::new(&config).unwrap();
        let envelope = producer.produce(&sample_traces(0)).unwrap();
        let decoded = StreamConsumer::new().consume_envelope(&envelope).unwrap();

        let spans = decoded.table(PayloadType::Spans).unwrap();
        let resource_ids = spans.column("resource.id").and_then(|c| c.as_u16()).unwrap();
        assert_eq!(distinct_u16(resource_ids).len(), resources, "dedup: {}", config.dedup);

        let resource_attrs = decoded.table(PayloadType::ResourceAttrs).unwrap();
        assert_eq!(resource_attrs.num_rows(), attr_rows, "dedup: {}", config.dedup);
    }
}

#[test]
fn shared_resource_across_scopes() {
    let input = metrics(vec![(
        resource("checkout"),
        vec![
            (Scope::new("http", "1.0"), vec![gauge("a", 1.0), gauge("b", 2.0)]),
            (Scope::new("db", "1.0"), vec![gauge("c", 3.0)]),
        ],
    )]);

    let cases = [
        (EncoderConfig::default(), [0].as_slice(), [0, 1].as_slice()),
        (no_dedup(), [0, 1, 2].as_slice(), [0, 1, 2].as_slice()),
    ];
    for (config, resource_ids, scope_ids) in cases {
        let mut producer = MetricsProducer::new(&config).unwrap();
        let envelope = producer.produce(&input).unwrap();
        let decoded = StreamConsumer::new().consume_envelope(&envelope).unwrap();

        let table = decoded.table(PayloadType::Metrics).unwrap();
        assert_eq!(table.num_rows(), 3);
        let resources = table.column("resource.id").and_then(|c| c.as_u16()).unwrap();
        let scopes = table.column("scope.id").and_then(|c| c.as_u16()).unwrap();
        assert_eq!(distinct_u16(resources), resource_ids.iter().copied().collect());
        assert_eq!(distinct_u16(scopes), scope_ids.iter().copied().collect());
    }
}

fn distinct_resources(count: i64) -> strata_model::Traces {
    traces(
        (0..count)
            .map(|i| {
                let resource = Resource::from_attributes(vec![KeyValue::new("host.id", i)]);
                (resource, vec![(Scope::new("s", ""), vec![span("op", 1)])])
            })
            .collect(),
    )
}

#[test]
fn full_resource_id_space_fits() {
    let mut producer = TracesProducer::new(&EncoderConfig::default()).unwrap();
    let envelope = producer.produce(&distinct_resources(65_536)).unwrap();
    let decoded = StreamConsumer::new().consume_envelope(&envelope).unwrap();

    let spans = decoded.table(PayloadType::Spans).unwrap();
    let resource_ids = spans.column("resource.id").and_then(|c| c.as_u16()).unwrap();
    let ids = distinct_u16(resource_ids);
    assert_eq!(ids.len(), 65_536);
    assert_eq!(ids.last(), Some(&u16::MAX));
}

#[test]
fn exhausted_resource_ids_fail_only_the_batch() {
    let mut producer = TracesProducer::new(&EncoderConfig::default()).unwrap();
    match producer.produce(&distinct_resources(65_537)) {
        Err(EncodeError::CapacityExceeded { entity, id }) => {
            assert_eq!(entity, "resource");
            assert_eq!(id, 65536);
        }
        other => panic!("expected CapacityExceeded, got {:?}", other.map(|envelope| envelope.batch_id)),
    }
    assert!(!producer.is_poisoned());
    assert_eq!(producer.open_streams(), 0);

    let envelope = producer.produce(&sample_traces(0)).unwrap();
    assert_eq!(envelope.batch_id, 0);
}

#[test]
fn related_rows_follow_main_rows() {
    let mut producer = TracesProducer::new(&EncoderConfig::default()).unwrap();
    let envelope = producer.produce(&sample_traces(3)).unwrap();
    let decoded = StreamConsumer::new().consume_envelope(&envelope).unwrap();

    let span_ids = decoded
        .table(PayloadType::Spans)
        .and_then(|t| t.column("id"))
        .and_then(|c| c.as_u16())
        .map(distinct_u16)
        .unwrap();
    assert_eq!(span_ids.len(), 2);

    for payload_type in [PayloadType::SpanAttrs, PayloadType::SpanEvents, PayloadType::SpanLinks] {
        let parents = decoded
            .table(payload_type)
            .and_then(|t| t.column("parent_id"))
            .and_then(|c| c.as_u16())
            .unwrap();
        assert!(
            parents.windows(2).all(|w| w[0] <= w[1]),
            "{} parent IDs out of order",
            payload_type
        );
        assert!(
            parents.iter().flatten().all(|id| span_ids.contains(id)),
            "{} references unknown span",
            payload_type
        );
    }
}

#[test]
fn close_ends_every_stream() {
    let mut producer = TracesProducer::new(&EncoderConfig::default()).unwrap();
    let mut consumer = StreamConsumer::new();

    let envelope = producer.produce(&sample_traces(0)).unwrap();
    consumer.consume_envelope(&envelope).unwrap();
    assert_eq!(consumer.open_streams(), envelope.payloads.len());
    assert_eq!(producer.open_streams(), envelope.payloads.len());

    let closing = producer.close().unwrap();
    assert_eq!(closing.len(), envelope.payloads.len());
    assert!(closing.windows(2).all(|w| w[0].payload_type < w[1].payload_type));
    for payload in &closing {
        assert!(consumer.consume(payload).unwrap().is_empty());
    }
    assert_eq!(consumer.open_streams(), 0);
    assert_eq!(producer.open_streams(), 0);

    assert!(producer.close().unwrap().is_empty());
    assert!(matches!(
        producer.produce(&sample_traces(0)),
        Err(EncodeError::Released)
    ));
}
