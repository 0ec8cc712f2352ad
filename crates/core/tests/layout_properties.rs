use rnastruct_core::{compute_layout, draw_structure, parse, Coordinate, DrawResult, LayoutConfig};

fn layout(structure: &str) -> DrawResult {
    compute_layout(structure, &LayoutConfig::default()).expect(structure)
}

fn pair_deviation(result: &DrawResult) -> f64 {
    let c: &[Coordinate] = &result.layout.coordinates;
    result
        .pairs
        .iter()
        .enumerate()
        .filter(|&(i, &j)| i < j)
        .map(|(i, &j)| (c[i].distance(&c[j]) - 1.0).abs())
        .fold(0.0, f64::max)
}

#[test]
fn test_hairpin_pairs_at_unit_distance() {
    let result = layout("((((....))))");
    assert_eq!(result.layout.coordinates.len(), 12);
    assert!(pair_deviation(&result) < 0.3);
    assert_eq!(result.layout.energy.crossings, 0);
}

#[test]
fn test_two_hairpins_pairs_at_unit_distance() {
    let result = layout("((((...))))..((((...))))");
    assert_eq!(result.layout.coordinates.len(), 24);
    assert!(pair_deviation(&result) < 0.3);
    assert_eq!(result.layout.energy.crossings, 0);
}

#[test]
fn test_unpaired_chain_keeps_bond_lengths() {
    let result = layout("..........");
    let c = &result.layout.coordinates;
    for k in 0..c.len() - 1 {
        let d = c[k].distance(&c[k + 1]);
        assert!((d - 1.0).abs() < 1e-6, "bond {k}: {d}");
    }
    assert_eq!(result.layout.energy.crossings, 0);
}

#[test]
fn test_pseudoknot_has_no_crossings() {
    let result = layout("(([))]");
    assert_eq!(result.layout.energy.crossings, 0);
    assert!(result
        .layout
        .coordinates
        .iter()
        .all(|c| c.x.is_finite() && c.y.is_finite()));
}

#[test]
fn test_h_type_pseudoknot_pairs_at_unit_distance() {
    let result = layout("..(((((...[[[...)))))...]]]..");
    assert!(result.layout.evaluations > 0);
    assert_eq!(result.layout.energy.crossings, 0);
    let worst = pair_deviation(&result);
    assert!(worst < 0.3, "worst {worst}, {:?}", result.layout.energy);
}

#[test]
fn test_h_type_pseudoknot_across_windows() {
    // 47 residues: refined in windows of 24, 40 and 47
    let result = layout("....((((((.....[[[[[[....))))))......]]]]]]....");
    assert!(result.layout.evaluations > 0);
    assert_eq!(result.layout.energy.crossings, 0);
    let worst = pair_deviation(&result);
    assert!(worst < 0.3, "worst {worst}, {:?}", result.layout.energy);
}

#[test]
fn test_pseudoknot_around_hairpin_improves_on_seed() {
    // The crossing strand has to wrap around a whole hairpin, so pair
    // penalties are reduced rather than removed here.
    let structure = "((((((((....[[[[....))))))))....((((....))))....]]]]";
    let seeded = compute_layout(
        structure,
        &LayoutConfig {
            refine: false,
            ..LayoutConfig::default()
        },
    )
    .unwrap();
    let result = layout(structure);
    assert_eq!(seeded.layout.energy.crossings, 0);
    assert_eq!(result.layout.energy.crossings, 0);
    assert!(result.layout.energy.total < seeded.layout.energy.total);
}

#[test]
fn test_layout_is_centred() {
    let result = layout("((((...))))..((((...))))");
    let c = &result.layout.coordinates;
    let span = |coord: fn(&Coordinate) -> f64| {
        c.iter()
            .map(coord)
            .fold((f64::MAX, f64::MIN), |(lo, hi), v| (lo.min(v), hi.max(v)))
    };
    let (min_x, max_x) = span(|p| p.x);
    let (min_y, max_y) = span(|p| p.y);
    assert!((min_x + max_x).abs() < 1e-9);
    assert!((min_y + max_y).abs() < 1e-9);
}

#[test]
fn test_multi_strand_layout() {
    let result = layout("((((+))))");
    assert_eq!(result.nicks, vec![0, 4]);
    assert!(pair_deviation(&result) < 0.3);
}

#[test]
fn test_round_trip_through_result() {
    for structure in ["((..((...))..))", "..((..[[..))..]]..", "(((.+.)))"] {
        let result = layout(structure);
        assert_eq!(result.dot_bracket, structure);
        assert_eq!(result.pairs, parse(structure).unwrap().pairs);
    }
}

#[test]
fn test_draw_structure_json() {
    let json = draw_structure("((((....))))");
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["pairs"].as_array().unwrap().len(), 12);
    assert_eq!(value["nicks"], serde_json::json!([0]));
    assert_eq!(value["dot_bracket"], "((((....))))");
    assert_eq!(value["layout"]["coordinates"].as_array().unwrap().len(), 12);
    assert_eq!(value["layout"]["records"].as_array().unwrap().len(), 12);
    assert_eq!(value["layout"]["records"][0]["partner"], 11);
    assert!(value["layout"]["energy"]["total"].is_number());
}

#[test]
fn test_invalid_input_gives_empty_json() {
    assert_eq!(draw_structure("((.)"), "");
    assert_eq!(draw_structure("((x))"), "");
}

#[test]
fn test_empty_structure() {
    let result = layout("");
    assert!(result.layout.coordinates.is_empty());
    assert_eq!(result.dot_bracket, "");
}
