use proptest::prelude::*;
use std::sync::Arc;
use zipkin_collector::codec::{decode_span, deserialize_span, log_entry, serialize_span};
use zipkin_collector::convert::to_wire_timestamp;
use zipkin_collector::{
    assemble_span, translate_annotation, Annotation, Endpoint, EndpointCache, WireAnnotation,
    WireEndpoint,
};

fn endpoint_strategy() -> impl Strategy<Value = Endpoint> {
    (any::<u32>(), any::<u16>(), "[a-z][a-z0-9-]{0,15}")
        .prop_map(|(ipv4, port, name)| Endpoint::new(ipv4, port, name))
}

fn annotation_strategy() -> impl Strategy<Value = Annotation> {
    (
        i64::MIN / 1000..=i64::MAX / 1000,
        prop_oneof![Just("cs"), Just("cr"), Just("sr"), Just("ss"), Just("custom")],
        endpoint_strategy(),
        proptest::option::of(any::<i32>()),
    )
        .prop_map(|(ts, name, endpoint, duration)| {
            let annotation = Annotation::new(ts, name, endpoint);
            match duration {
                Some(d) => annotation.with_duration(d),
                None => annotation,
            }
        })
}

fn wire_annotations(annotations: &[Annotation], cache: &EndpointCache) -> Vec<WireAnnotation> {
    annotations
        .iter()
        .map(|a| translate_annotation(a, cache.get_or_create(&a.endpoint)))
        .collect()
}

proptest! {
    #[test]
    fn prop_timestamp_scaled_exactly(ms in i64::MIN / 1000..=i64::MAX / 1000) {
        prop_assert_eq!(to_wire_timestamp(ms), ms * 1000);
    }

    #[test]
    fn prop_annotation_translation(annotation in annotation_strategy()) {
        let cache = EndpointCache::new();
        let host = cache.get_or_create(&annotation.endpoint);
        let wire = translate_annotation(&annotation, Arc::clone(&host));

        prop_assert_eq!(wire.timestamp, annotation.timestamp_ms * 1000);
        prop_assert_eq!(&wire.value, &annotation.name);
        prop_assert_eq!(wire.duration, annotation.duration);
        prop_assert!(Arc::ptr_eq(wire.host.as_ref().unwrap(), &host));
    }

    #[test]
    fn prop_span_survives_the_wire(
        trace_id in any::<i64>(),
        id in any::<i64>(),
        parent_id in proptest::option::of(any::<i64>()),
        name in ".{0,32}",
        annotations in proptest::collection::vec(annotation_strategy(), 0..8),
    ) {
        let cache = EndpointCache::new();
        let span = assemble_span(trace_id, &name, id, parent_id, wire_annotations(&annotations, &cache));

        let entry = log_entry(&span).unwrap();
        prop_assert_eq!(entry.category.as_str(), "zipkin");

        let decoded = decode_span(&entry.message).unwrap();
        prop_assert_eq!(&decoded, &span);
        prop_assert_eq!(decoded.parent_id, parent_id);
        prop_assert_eq!(decoded.debug, Some(true));
        prop_assert!(decoded.binary_annotations.is_empty());
    }

    #[test]
    fn prop_serialization_is_deterministic(
        trace_id in any::<i64>(),
        id in any::<i64>(),
        annotations in proptest::collection::vec(annotation_strategy(), 0..4),
    ) {
        let cache = EndpointCache::new();
        let span = assemble_span(trace_id, "op", id, None, wire_annotations(&annotations, &cache));

        let first = serialize_span(&span).unwrap();
        let second = serialize_span(&deserialize_span(&first).unwrap()).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_endpoint_bits_preserved(endpoint in endpoint_strategy()) {
        let wire = WireEndpoint::from(&endpoint);
        prop_assert_eq!(wire.ipv4 as u32, endpoint.ipv4);
        prop_assert_eq!(wire.port as u16, endpoint.port);
        prop_assert_eq!(&wire.service_name, &endpoint.service_name);
    }
}

#[test]
fn test_parent_zero_is_not_absent() {
    let root = assemble_span(1, "op", 1, None, Vec::new());
    let child = assemble_span(1, "op", 2, Some(0), Vec::new());

    let root = deserialize_span(&serialize_span(&root).unwrap()).unwrap();
    let child = deserialize_span(&serialize_span(&child).unwrap()).unwrap();

    assert_eq!(root.parent_id, None);
    assert_eq!(child.parent_id, Some(0));
}
