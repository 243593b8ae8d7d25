#![allow(dead_code)]

use proptest::prelude::*;
use strata_model::{
    metric::{
        AggregationTemporality, Buckets, Exemplar, ExponentialHistogramDataPoint, HistogramDataPoint, Metric,
        MetricData, NumberDataPoint, NumberValue, ResourceMetrics, ScopeMetrics, SummaryDataPoint, ValueAtQuantile,
    },
    trace::{Event, Link, ResourceSpans, ScopeSpans, Span, SpanKind, Status, StatusCode},
    AnyValue, Attributes, KeyValue, Metrics, Resource, Scope, Traces,
};

pub fn resource(service: &str) -> Resource {
    Resource::from_attributes(vec![
        KeyValue::new("service.name", service),
        KeyValue::new("host.cores", 8i64),
    ])
}

pub fn span(name: &str, seed: u8) -> Span {
    Span {
        trace_id: [seed; 16],
        span_id: [seed.wrapping_add(1); 8],
        parent_span_id: (seed % 2 == 0).then_some([seed.wrapping_add(2); 8]),
        name: name.to_string(),
        kind: SpanKind::from_i32(i32::from(seed % 6)),
        start_time_unix_nano: 1_700_000_000_000_000_000 + u64::from(seed) * 1_000,
        end_time_unix_nano: 1_700_000_000_000_000_000 + u64::from(seed) * 1_000 + 750,
        ..Default::default()
    }
}

/// A span with attributes, events and links.
pub fn rich_span(name: &str, seed: u8) -> Span {
    Span {
        attributes: vec![
            KeyValue::new("http.method", "GET"),
            KeyValue::new("http.status_code", 200i64 + i64::from(seed)),
            KeyValue::new("sampled", seed % 2 == 0),
            KeyValue::new("ratio", 0.5f64),
            KeyValue::new("payload", AnyValue::Bytes(vec![seed, 0, 255])),
            KeyValue::new(
                "nested",
                AnyValue::KvList(vec![KeyValue::new(
                    "inner",
                    AnyValue::Array(vec![AnyValue::Int(1), AnyValue::Double(f64::NEG_INFINITY), AnyValue::Empty]),
                )]),
            ),
        ],
        events: vec![
            Event {
                time_unix_nano: 10,
                name: "enqueue".into(),
                ..Default::default()
            },
            Event {
                time_unix_nano: 20,
                name: "dequeue".into(),
                attributes: vec![KeyValue::new("queue", "jobs")],
                dropped_attributes_count: 1,
            },
        ],
        links: vec![Link {
            trace_id: [9; 16],
            span_id: [seed; 8],
            trace_state: "vendor=1".into(),
            flags: 1,
            attributes: vec![KeyValue::new("link.kind", "follows_from")],
            dropped_attributes_count: 0,
        }],
        dropped_events_count: 2,
        status: Status {
            code: StatusCode::Error,
            message: "upstream failed".into(),
        },
        ..span(name, seed)
    }
}

pub fn traces(groups: Vec<(Resource, Vec<(Scope, Vec<Span>)>)>) -> Traces {
    Traces {
        resource_spans: groups
            .into_iter()
            .map(|(resource, scopes)| ResourceSpans {
                resource,
                schema_url: String::new(),
                scope_spans: scopes
                    .into_iter()
                    .map(|(scope, spans)| ScopeSpans {
                        scope,
                        schema_url: "https://opentelemetry.io/schemas/1.24.0".into(),
                        spans,
                    })
                    .collect(),
            })
            .collect(),
    }
}

/// A traces batch with repeated resources and scopes across groups.
pub fn sample_traces(offset: u8) -> Traces {
    traces(vec![
        (
            resource("checkout"),
            vec![
                (
                    Scope::new("http", "1.0"),
                    vec![rich_span("GET /cart", offset), span("GET /health", offset + 1)],
                ),
                (Scope::new("db", "2.1"), vec![span("SELECT", offset + 2)]),
            ],
        ),
        (
            resource("payments"),
            vec![(Scope::new("http", "1.0"), vec![span("POST /charge", offset + 3)])],
        ),
        (
            resource("checkout"),
            vec![(
                Scope::new("http", "1.0"),
                vec![rich_span("GET /cart", offset + 4), span("DELETE /cart", offset + 5)],
            )],
        ),
    ])
}

pub fn gauge(name: &str, value: f64) -> Metric {
    Metric {
        name: name.to_string(),
        unit: "By".into(),
        data: MetricData::Gauge {
            data_points: vec![NumberDataPoint {
                time_unix_nano: 1_000,
                value: NumberValue::Double(value),
                ..Default::default()
            }],
        },
        ..Default::default()
    }
}

pub fn metrics(groups: Vec<(Resource, Vec<(Scope, Vec<Metric>)>)>) -> Metrics {
    Metrics {
        resource_metrics: groups
            .into_iter()
            .map(|(resource, scopes)| ResourceMetrics {
                resource,
                schema_url: String::new(),
                scope_metrics: scopes
                    .into_iter()
                    .map(|(scope, metrics)| ScopeMetrics {
                        scope,
                        schema_url: String::new(),
                        metrics,
                    })
                    .collect(),
            })
            .collect(),
    }
}

pub fn sample_metrics(offset: u64) -> Metrics {
    let sum = Metric {
        name: "http.requests".into(),
        description: "Handled requests".into(),
        data: MetricData::Sum {
            data_points: vec![
                NumberDataPoint {
                    attributes: vec![KeyValue::new("route", "/cart")],
                    start_time_unix_nano: 500,
                    time_unix_nano: 1_000 + offset,
                    value: NumberValue::Int(12 + offset as i64),
                    exemplars: vec![Exemplar {
                        filtered_attributes: vec![KeyValue::new("user", "u-1")],
                        time_unix_nano: 900,
                        value: NumberValue::Int(1),
                        span_id: Some([1; 8]),
                        trace_id: Some([2; 16]),
                    }],
                    flags: 0,
                },
                NumberDataPoint {
                    time_unix_nano: 1_000 + offset,
                    value: NumberValue::Int(3),
                    ..Default::default()
                },
            ],
            aggregation_temporality: AggregationTemporality::Cumulative,
            is_monotonic: true,
        },
        ..Default::default()
    };
    let histogram = Metric {
        name: "http.latency".into(),
        unit: "ms".into(),
        data: MetricData::Histogram {
            data_points: vec![HistogramDataPoint {
                time_unix_nano: 1_000 + offset,
                count: 6,
                sum: Some(42.0),
                bucket_counts: vec![1, 2, 3],
                explicit_bounds: vec![5.0, 10.0],
                min: Some(1.0),
                max: Some(12.5),
                exemplars: vec![Exemplar {
                    value: NumberValue::Double(12.5),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            aggregation_temporality: AggregationTemporality::Delta,
        },
        ..Default::default()
    };
    let summary = Metric {
        name: "gc.pause".into(),
        data: MetricData::Summary {
            data_points: vec![SummaryDataPoint {
                time_unix_nano: 1_000 + offset,
                count: 4,
                sum: 2.5,
                quantile_values: vec![
                    ValueAtQuantile {
                        quantile: 0.5,
                        value: 0.4,
                    },
                    ValueAtQuantile {
                        quantile: 0.99,
                        value: 1.1,
                    },
                ],
                ..Default::default()
            }],
        },
        ..Default::default()
    };

    metrics(vec![
        (
            resource("checkout"),
            vec![
                (Scope::new("http", "1.0"), vec![sum, histogram]),
                (Scope::new("runtime", ""), vec![summary, gauge("heap.used", 1024.0)]),
            ],
        ),
        (
            resource("payments"),
            vec![(Scope::new("runtime", ""), vec![gauge("heap.used", 2048.0)])],
        ),
    ])
}

/// Flattens traces into one sorted entry per span, so that trees with different grouping or ordering compare equal.
pub fn normalize_traces(traces: &Traces) -> Vec<String> {
    let mut rows = Vec::new();
    for rs in &traces.resource_spans {
        for ss in &rs.scope_spans {
            for span in &ss.spans {
                rows.push(format!(
                    "{:?}|{}|{:?}|{}|{:?}",
                    rs.resource, rs.schema_url, ss.scope, ss.schema_url, span
                ));
            }
        }
    }
    rows.sort();
    rows
}

/// Flattens metrics into one sorted entry per metric.
pub fn normalize_metrics(metrics: &Metrics) -> Vec<String> {
    let mut rows = Vec::new();
    for rm in &metrics.resource_metrics {
        for sm in &rm.scope_metrics {
            for metric in &sm.metrics {
                rows.push(format!(
                    "{:?}|{}|{:?}|{}|{:?}",
                    rm.resource, rm.schema_url, sm.scope, sm.schema_url, metric
                ));
            }
        }
    }
    rows.sort();
    rows
}

/// Doubles, weighted towards the ones that are easy to mangle.
pub fn arb_double() -> impl Strategy<Value = f64> {
    prop_oneof![
        Just(0.0),
        Just(-0.0),
        Just(f64::INFINITY),
        Just(f64::NEG_INFINITY),
        Just(f64::NAN),
        Just(f64::MIN_POSITIVE),
        Just(f64::MAX),
        any::<f64>(),
    ]
}

pub fn arb_value() -> impl Strategy<Value = AnyValue> {
    let leaf = prop_oneof![
        Just(AnyValue::Empty),
        "[a-z]{0,3}".prop_map(AnyValue::Str),
        any::<i64>().prop_map(AnyValue::Int),
        arb_double().prop_map(AnyValue::Double),
        any::<bool>().prop_map(AnyValue::Bool),
        prop::collection::vec(any::<u8>(), 0..3).prop_map(AnyValue::Bytes),
    ];
    leaf.prop_recursive(2, 8, 3, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..3).prop_map(AnyValue::Array),
            prop::collection::vec(("[a-c]", inner), 0..3).prop_map(|kvs| AnyValue::KvList(key_values(kvs))),
        ]
    })
}

fn key_values(kvs: Vec<(String, AnyValue)>) -> Attributes {
    kvs.into_iter().map(|(k, v)| KeyValue::new(k, v)).collect()
}

pub fn arb_attributes() -> impl Strategy<Value = Attributes> {
    prop::collection::vec(("[a-d]{1,2}", arb_value()), 0..3).prop_map(key_values)
}

/// A small pool of resources, so that generated batches repeat and reorder them.
pub fn pooled_resource(index: usize) -> Resource {
    match index % 3 {
        0 => resource("checkout"),
        1 => Resource {
            attributes: vec![
                KeyValue::new("limits", AnyValue::Array(vec![AnyValue::Double(f64::INFINITY), AnyValue::Int(-1)])),
                KeyValue::new("region", "eu"),
            ],
            dropped_attributes_count: 2,
        },
        _ => Resource::default(),
    }
}

pub fn pooled_scope(index: usize) -> Scope {
    match index % 3 {
        0 => Scope::new("http", "1.0"),
        1 => Scope {
            attributes: vec![KeyValue::new("shard", 3i64)],
            ..Scope::new("db", "")
        },
        _ => Scope::default(),
    }
}

fn arb_event() -> impl Strategy<Value = Event> {
    (any::<u64>(), "[a-z]{0,4}", arb_attributes(), 0u32..3).prop_map(
        |(time_unix_nano, name, attributes, dropped_attributes_count)| Event {
            time_unix_nano,
            name,
            attributes,
            dropped_attributes_count,
        },
    )
}

fn arb_link() -> impl Strategy<Value = Link> {
    (
        any::<[u8; 16]>(),
        any::<[u8; 8]>(),
        "[a-z=]{0,4}",
        any::<u32>(),
        arb_attributes(),
        0u32..3,
    )
        .prop_map(
            |(trace_id, span_id, trace_state, flags, attributes, dropped_attributes_count)| Link {
                trace_id,
                span_id,
                trace_state,
                flags,
                attributes,
                dropped_attributes_count,
            },
        )
}

pub fn arb_span() -> impl Strategy<Value = Span> {
    let ids = (
        any::<[u8; 16]>(),
        any::<[u8; 8]>(),
        "[a-z=]{0,4}",
        prop::option::of(any::<[u8; 8]>()),
        any::<u32>(),
        "[a-z /]{0,6}",
        0i32..6,
    );
    let body = (
        any::<u64>(),
        any::<u64>(),
        arb_attributes(),
        0u32..3,
        prop::collection::vec(arb_event(), 0..3),
        0u32..3,
    );
    let tail = (prop::collection::vec(arb_link(), 0..2), 0u32..3, 0i32..3, "[a-z]{0,4}");

    (ids, body, tail).prop_map(|(ids, body, tail)| {
        let (trace_id, span_id, trace_state, parent_span_id, flags, name, kind) = ids;
        let (start_time_unix_nano, end_time_unix_nano, attributes, dropped_attributes_count, events, dropped_events) =
            body;
        let (links, dropped_links_count, code, message) = tail;
        Span {
            trace_id,
            span_id,
            trace_state,
            parent_span_id,
            flags,
            name,
            kind: SpanKind::from_i32(kind),
            start_time_unix_nano,
            end_time_unix_nano,
            attributes,
            dropped_attributes_count,
            events,
            dropped_events_count: dropped_events,
            links,
            dropped_links_count,
            status: Status {
                code: StatusCode::from_i32(code),
                message,
            },
        }
    })
}

/// Pairs of pool indices and leaves, nested into resource and scope groups.
fn arb_groups<S: Strategy>(leaves: S) -> impl Strategy<Value = Vec<(usize, Vec<(usize, Vec<S::Value>)>)>> {
    prop::collection::vec(
        (
            0usize..3,
            prop::collection::vec((0usize..3, prop::collection::vec(leaves, 0..3)), 0..3),
        ),
        0..4,
    )
}

pub fn arb_traces() -> impl Strategy<Value = Traces> {
    arb_groups(arb_span()).prop_map(|groups| {
        traces(
            groups
                .into_iter()
                .map(|(r, scopes)| {
                    let scopes = scopes.into_iter().map(|(s, spans)| (pooled_scope(s), spans)).collect();
                    (pooled_resource(r), scopes)
                })
                .collect(),
        )
    })
}

fn arb_number_value() -> impl Strategy<Value = NumberValue> {
    prop_oneof![
        any::<i64>().prop_map(NumberValue::Int),
        arb_double().prop_map(NumberValue::Double),
    ]
}

fn arb_exemplar() -> impl Strategy<Value = Exemplar> {
    (
        arb_attributes(),
        any::<u64>(),
        arb_number_value(),
        prop::option::of(any::<[u8; 8]>()),
        prop::option::of(any::<[u8; 16]>()),
    )
        .prop_map(|(filtered_attributes, time_unix_nano, value, span_id, trace_id)| Exemplar {
            filtered_attributes,
            time_unix_nano,
            value,
            span_id,
            trace_id,
        })
}

fn arb_exemplars() -> impl Strategy<Value = Vec<Exemplar>> {
    prop::collection::vec(arb_exemplar(), 0..2)
}

fn arb_number_dp() -> impl Strategy<Value = NumberDataPoint> {
    (
        arb_attributes(),
        any::<u64>(),
        any::<u64>(),
        arb_number_value(),
        arb_exemplars(),
        0u32..2,
    )
        .prop_map(
            |(attributes, start_time_unix_nano, time_unix_nano, value, exemplars, flags)| NumberDataPoint {
                attributes,
                start_time_unix_nano,
                time_unix_nano,
                value,
                exemplars,
                flags,
            },
        )
}

fn arb_histogram_dp() -> impl Strategy<Value = HistogramDataPoint> {
    let head = (arb_attributes(), any::<u64>(), any::<u64>(), any::<u64>(), prop::option::of(arb_double()));
    let tail = (
        prop::collection::vec(any::<u64>(), 0..3),
        prop::collection::vec(arb_double(), 0..3),
        arb_exemplars(),
        0u32..2,
        prop::option::of(arb_double()),
        prop::option::of(arb_double()),
    );
    (head, tail).prop_map(|(head, tail)| {
        let (attributes, start_time_unix_nano, time_unix_nano, count, sum) = head;
        let (bucket_counts, explicit_bounds, exemplars, flags, min, max) = tail;
        HistogramDataPoint {
            attributes,
            start_time_unix_nano,
            time_unix_nano,
            count,
            sum,
            bucket_counts,
            explicit_bounds,
            exemplars,
            flags,
            min,
            max,
        }
    })
}

fn arb_buckets() -> impl Strategy<Value = Buckets> {
    (-5i32..5, prop::collection::vec(any::<u64>(), 0..3))
        .prop_map(|(offset, bucket_counts)| Buckets { offset, bucket_counts })
}

fn arb_exp_histogram_dp() -> impl Strategy<Value = ExponentialHistogramDataPoint> {
    let head = (
        arb_attributes(),
        any::<u64>(),
        any::<u64>(),
        any::<u64>(),
        prop::option::of(arb_double()),
        -10i32..10,
        any::<u64>(),
    );
    let tail = (
        arb_buckets(),
        arb_buckets(),
        0u32..2,
        arb_exemplars(),
        prop::option::of(arb_double()),
        prop::option::of(arb_double()),
        arb_double(),
    );
    (head, tail).prop_map(|(head, tail)| {
        let (attributes, start_time_unix_nano, time_unix_nano, count, sum, scale, zero_count) = head;
        let (positive, negative, flags, exemplars, min, max, zero_threshold) = tail;
        ExponentialHistogramDataPoint {
            attributes,
            start_time_unix_nano,
            time_unix_nano,
            count,
            sum,
            scale,
            zero_count,
            positive,
            negative,
            flags,
            exemplars,
            min,
            max,
            zero_threshold,
        }
    })
}

fn arb_summary_dp() -> impl Strategy<Value = SummaryDataPoint> {
    (
        arb_attributes(),
        any::<u64>(),
        any::<u64>(),
        any::<u64>(),
        arb_double(),
        prop::collection::vec((arb_double(), arb_double()), 0..3),
        0u32..2,
    )
        .prop_map(
            |(attributes, start_time_unix_nano, time_unix_nano, count, sum, quantiles, flags)| SummaryDataPoint {
                attributes,
                start_time_unix_nano,
                time_unix_nano,
                count,
                sum,
                quantile_values: quantiles
                    .into_iter()
                    .map(|(quantile, value)| ValueAtQuantile { quantile, value })
                    .collect(),
                flags,
            },
        )
}

fn arb_metric_data() -> impl Strategy<Value = MetricData> {
    let temporality = || (0i32..3).prop_map(AggregationTemporality::from_i32);
    prop_oneof![
        Just(MetricData::Empty),
        prop::collection::vec(arb_number_dp(), 0..3).prop_map(|data_points| MetricData::Gauge { data_points }),
        (prop::collection::vec(arb_number_dp(), 0..3), temporality(), any::<bool>()).prop_map(
            |(data_points, aggregation_temporality, is_monotonic)| MetricData::Sum {
                data_points,
                aggregation_temporality,
                is_monotonic,
            }
        ),
        (prop::collection::vec(arb_histogram_dp(), 0..3), temporality()).prop_map(
            |(data_points, aggregation_temporality)| MetricData::Histogram {
                data_points,
                aggregation_temporality,
            }
        ),
        (prop::collection::vec(arb_exp_histogram_dp(), 0..3), temporality()).prop_map(
            |(data_points, aggregation_temporality)| MetricData::ExponentialHistogram {
                data_points,
                aggregation_temporality,
            }
        ),
        prop::collection::vec(arb_summary_dp(), 0..3).prop_map(|data_points| MetricData::Summary { data_points }),
    ]
}

pub fn arb_metric() -> impl Strategy<Value = Metric> {
    ("[a-z.]{0,6}", "[a-z ]{0,6}", "[a-zA-Z]{0,2}", arb_metric_data()).prop_map(|(name, description, unit, data)| {
        Metric {
            name,
            description,
            unit,
            data,
        }
    })
}

pub fn arb_metrics() -> impl Strategy<Value = Metrics> {
    arb_groups(arb_metric()).prop_map(|groups| {
        metrics(
            groups
                .into_iter()
                .map(|(r, scopes)| {
                    let scopes = scopes.into_iter().map(|(s, metrics)| (pooled_scope(s), metrics)).collect();
                    (pooled_resource(r), scopes)
                })
                .collect(),
        )
    })
}
