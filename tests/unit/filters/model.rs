use super::*;

#[test]
fn decodes_chain_with_defaults() {
    let json = r##"{
        "id": 7,
        "filters": [
            { "type": "Blur", "radius": 3 },
            { "type": "Color", "color": "#ff000080" },
            { "type": "Blend", "mode": "color-dodge", "source": 0 },
            { "type": "Noise" },
            { "type": "Sparkle", "amount": 2 }
        ]
    }"##;
    let chain: FilterChain = serde_json::from_str(json).unwrap();
    assert_eq!(chain.id, ChainId(7));
    assert_eq!(chain.len(), 5);

    assert!(matches!(chain.filters[0].kind, FilterKind::Blur { radius } if radius == 3.0));
    assert_eq!(chain.filters[0].source_index(), Some(-1));
    assert_eq!(chain.filters[0].destination_index(), None);

    assert_eq!(chain.filters[1].source_index(), None);

    assert!(matches!(
        chain.filters[2].kind,
        FilterKind::Blend {
            mode: BlendMode::ColorDodge
        }
    ));
    assert_eq!(chain.filters[2].source_index(), Some(0));
    assert_eq!(chain.filters[2].destination_index(), Some(-2));

    match chain.filters[3].kind {
        FilterKind::Noise {
            kind,
            sigma,
            use_color,
        } => {
            assert_eq!(kind, NoiseKind::Uniform);
            assert_eq!(sigma, 10.0);
            assert!(!use_color);
        }
        ref other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(chain.filters[4].kind, FilterKind::Unknown));
    assert_eq!(chain.filters[4].source_index(), Some(-1));
}

#[test]
fn unknown_blend_mode_decodes_as_unknown() {
    let d: FilterDesc = serde_json::from_str(r#"{ "type": "Blend", "mode": "plus-darker" }"#).unwrap();
    assert!(matches!(
        d.kind,
        FilterKind::Blend {
            mode: BlendMode::Unknown
        }
    ));
}

#[test]
fn extension_destination_is_opt_in() {
    let d = FilterDesc::new(FilterKind::Extension {
        uri: "ext:a".into(),
        name: "f".into(),
        params: serde_json::Value::Null,
    });
    assert_eq!(d.destination_index(), None);
    assert_eq!(d.clone().with_destination(0).destination_index(), Some(0));
}

#[test]
fn chains_without_ids_get_distinct_identities() {
    let a: FilterChain = serde_json::from_str(r#"{ "filters": [] }"#).unwrap();
    let b: FilterChain = serde_json::from_str(r#"{ "filters": [] }"#).unwrap();
    assert_ne!(a.id, b.id);
    assert_ne!(FilterChain::new(Vec::new()).id, FilterChain::new(Vec::new()).id);
    assert_eq!(FilterChain::new(Vec::new()).with_id(3).id, ChainId(3));
}

#[test]
fn gradient_desc_decodes() {
    let d: FilterDesc = serde_json::from_str(
        r##"{ "type": "Gradient", "gradient": {
            "type": "Radial", "center": { "x": 0.5, "y": 0.5 }, "radius": 0.5,
            "stops": [ { "offset": 0, "color": "#000" }, { "offset": 1, "color": "#fff" } ],
            "spread": "reflect" } }"##,
    )
    .unwrap();
    let FilterKind::Gradient {
        gradient: GradientDesc::Radial { radius, spread, stops, .. },
    } = d.kind
    else {
        panic!("expected radial gradient");
    };
    assert_eq!(radius, 0.5);
    assert_eq!(spread, Spread::Reflect);
    assert_eq!(stops.len(), 2);
}
