//! Operation replay against a live fake instance.

use super::common::*;
use render_test_rs::operations::ReplaySummary;
use std::fs;

fn scenario(operations: serde_json::Value) -> TestMetadata {
    TestMetadata::new(
        "render-tests/replay/style.json",
        json!({"version": 8, "metadata": {"test": {"operations": operations}}}),
    )
}

fn resolver(dir: &TempDir) -> ReferenceResolver {
    ReferenceResolver::new(fixture_roots(dir.path()))
}

fn load_style(instance: &mut MapInstance<FakeFrontend>, style: serde_json::Value) {
    instance.map.style_mut().load_json(&style.to_string());
}

#[test]
fn test_set_zoom_then_center() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let resolver = resolver(&dir);
    let mut instance = fake_instance();
    let mut metadata = scenario(json!([["setZoom", 5], ["setCenter", [10, 20]]]));

    let summary = OperationInterpreter::new(&mut instance, &resolver).run(&mut metadata);

    assert_eq!(summary, ReplaySummary { applied: 2, failed: 0 });
    assert_eq!(instance.map.camera.zoom, 5.0);
    assert_eq!(instance.map.camera.center.longitude, 10.0);
    assert_eq!(instance.map.camera.center.latitude, 20.0);
    assert_eq!(metadata.pending_operations(), 0);
}

#[test]
fn test_list_shrinks_in_order() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let resolver = resolver(&dir);
    let mut instance = fake_instance();
    let mut metadata = scenario(json!([["setZoom", 1], ["setZoom", 2], ["setBearing", 90]]));
    let mut interpreter = OperationInterpreter::new(&mut instance, &resolver);

    assert!(interpreter.step(&mut metadata).unwrap().is_ok());
    assert_eq!(metadata.pending_operations(), 2);
    assert_eq!(
        metadata.test_value().unwrap()["operations"][0],
        json!(["setZoom", 2])
    );

    assert!(interpreter.step(&mut metadata).unwrap().is_ok());
    assert_eq!(metadata.pending_operations(), 1);

    assert!(interpreter.step(&mut metadata).unwrap().is_ok());
    assert_eq!(metadata.pending_operations(), 0);
    assert!(interpreter.step(&mut metadata).is_none());

    assert_eq!(instance.map.camera.zoom, 2.0);
    assert_eq!(instance.map.camera.bearing, 90.0);
}

#[test]
fn test_bad_operations_do_not_stop_replay() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let resolver = resolver(&dir);
    let mut instance = fake_instance();
    let mut metadata = scenario(json!([
        ["flyTo", {"zoom": 3}],
        "wait",
        [],
        ["setZoom", "far"],
        ["removeLayer", "does-not-exist"],
        ["setZoom", 3]
    ]));

    let summary = OperationInterpreter::new(&mut instance, &resolver).run(&mut metadata);

    assert_eq!(summary, ReplaySummary { applied: 2, failed: 4 });
    assert_eq!(instance.map.camera.zoom, 3.0);
    assert_eq!(metadata.pending_operations(), 0);
}

#[test]
fn test_wait_and_sleep() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let resolver = resolver(&dir);
    let mut instance = fake_instance();
    let mut metadata = scenario(json!([["wait"], ["sleep", 20], ["wait"]]));

    let summary = OperationInterpreter::new(&mut instance, &resolver).run(&mut metadata);

    assert_eq!(summary.failed, 0);
    assert_eq!(instance.frontend.renders, 2);
    assert!(instance.frontend.run_once_calls >= 1);
}

#[test]
fn test_add_update_and_remove_image() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let resolver = resolver(&dir);
    let image_dir = resolver.roots().integration.join("image");
    fs::create_dir_all(&image_dir).unwrap();
    expected_frame(4, 2, 0)
        .save_with_format(image_dir.join("marker.png"), image::ImageFormat::Png)
        .unwrap();

    let mut instance = fake_instance();
    let mut metadata = scenario(json!([
        ["addImage", "\"marker\"", "\"image/marker.png\"", {"pixelRatio": 2, "sdf": true}],
        ["addImage", "missing", "image/missing.png"]
    ]));
    let summary = OperationInterpreter::new(&mut instance, &resolver).run(&mut metadata);

    assert_eq!(summary, ReplaySummary { applied: 1, failed: 1 });
    let marker = &instance.map.style.images["marker"];
    assert_eq!(marker.image.dimensions(), (4, 2));
    assert_eq!(marker.pixel_ratio, 2.0);
    assert!(marker.sdf);
    assert!(!instance.map.style.images.contains_key("missing"));

    let mut metadata = scenario(json!([["updateImage", "marker", "image/marker.png"]]));
    OperationInterpreter::new(&mut instance, &resolver).run(&mut metadata);
    let marker = &instance.map.style.images["marker"];
    assert_eq!(marker.pixel_ratio, 1.0);
    assert!(!marker.sdf);

    let mut metadata = scenario(json!([["removeImage", "marker"]]));
    OperationInterpreter::new(&mut instance, &resolver).run(&mut metadata);
    assert!(instance.map.style.images.is_empty());
}

#[test]
fn test_set_filter() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let resolver = resolver(&dir);
    let mut instance = fake_instance();
    load_style(
        &mut instance,
        json!({"layers": [{"id": "water", "type": "fill"}]}),
    );
    let mut interpreter = OperationInterpreter::new(&mut instance, &resolver);
    let mut metadata = scenario(json!([
        ["setFilter", "water", ["==", "class", "river"]],
        ["setFilter", "roads", ["==", "class", "street"]],
        ["setFilter", "water", "not a filter"]
    ]));

    assert!(interpreter.step(&mut metadata).unwrap().is_ok());
    assert!(matches!(
        interpreter.step(&mut metadata).unwrap(),
        Err(OperationError::LayerNotFound(layer)) if layer == "roads"
    ));
    assert!(matches!(
        interpreter.step(&mut metadata).unwrap(),
        Err(OperationError::Conversion { kind: "filter", .. })
    ));

    assert_eq!(
        instance.map.style.layers[0].filter,
        Some(json!(["==", "class", "river"]))
    );
}

#[test]
fn test_layer_operations() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let resolver = resolver(&dir);
    let mut instance = fake_instance();
    load_style(
        &mut instance,
        json!({"layers": [{"id": "background", "type": "background"}]}),
    );
    let mut metadata = scenario(json!([
        ["addLayer", {"id": "roads", "type": "line", "source": "streets"}],
        ["addLayer", {"type": "line"}],
        ["setLayerZoomRange", "roads", 4, 12],
        ["setPaintProperty", "roads", "line-width", 3],
        ["setPaintProperty", "roads", "line-color", null],
        ["setLayoutProperty", "roads", "visibility", "none"],
        ["setLayoutProperty", "roads", "visibility", "hidden"],
        ["setPaintProperty", "rivers", "fill-color", "blue"],
        ["removeLayer", "background"]
    ]));

    let summary = OperationInterpreter::new(&mut instance, &resolver).run(&mut metadata);

    assert_eq!(summary, ReplaySummary { applied: 5, failed: 4 });
    let layers = &instance.map.style.layers;
    assert_eq!(layers.len(), 1);
    let roads = &layers[0];
    assert_eq!(roads.id, "roads");
    assert_eq!((roads.min_zoom, roads.max_zoom), (4.0, 12.0));
    assert_eq!(roads.paint.get("line-width"), Some(&json!(3)));
    assert!(!roads.paint.contains_key("line-color"));
    assert_eq!(roads.layout.get("visibility"), Some(&json!("none")));
}

#[test]
fn test_property_error_names_layer_and_property() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let resolver = resolver(&dir);
    let mut instance = fake_instance();
    load_style(&mut instance, json!({"layers": [{"id": "roads", "type": "line"}]}));
    let mut metadata = scenario(json!([["setLayoutProperty", "roads", "visibility", 1]]));

    let result = OperationInterpreter::new(&mut instance, &resolver)
        .step(&mut metadata)
        .unwrap();
    match result {
        Err(err @ OperationError::Property { .. }) => {
            let message = err.to_string();
            assert!(message.contains("roads"), "{message}");
            assert!(message.contains("visibility"), "{message}");
        }
        other => panic!("expected a property error, got {other:?}"),
    }
}

#[test]
fn test_sources_and_light() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let resolver = resolver(&dir);
    fs::create_dir_all(resolver.roots().vendor.join("data")).unwrap();
    let mut instance = fake_instance();
    let mut metadata = scenario(json!([
        ["addSource", "points", {"type": "geojson", "data": "local://data/points.geojson"}],
        ["addSource", "broken", {"data": []}],
        ["addSource", "other", {"type": "geojson", "data": {"type": "FeatureCollection", "features": []}}],
        ["removeSource", "other"],
        ["removeSource", "never-added"],
        ["setLight", {"anchor": "map", "intensity": 0.5}],
        ["setLight", "bright"]
    ]));

    let summary = OperationInterpreter::new(&mut instance, &resolver).run(&mut metadata);

    assert_eq!(summary, ReplaySummary { applied: 5, failed: 2 });
    let style = &instance.map.style;
    assert_eq!(style.sources.len(), 1);
    assert_eq!(
        style.sources["points"].value["data"],
        json!(format!(
            "file://{}",
            resolver.roots().vendor.join("data/points.geojson").display()
        ))
    );
    assert_eq!(style.light, Some(json!({"anchor": "map", "intensity": 0.5})));
}

#[test]
fn test_set_style() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let resolver = resolver(&dir);
    let styles = resolver.roots().integration.join("styles");
    fs::create_dir_all(&styles).unwrap();
    fs::write(
        styles.join("two-layers.json"),
        json!({
            "version": 8,
            "sprite": "local://styles/sprite",
            "layers": [{"id": "a", "type": "fill"}, {"id": "b", "type": "line"}]
        })
        .to_string(),
    )
    .unwrap();

    let mut instance = fake_instance();
    let mut metadata = scenario(json!([
        ["setStyle", "local://styles/two-layers.json"],
        ["setStyle", "local://styles/missing.json"]
    ]));
    let summary = OperationInterpreter::new(&mut instance, &resolver).run(&mut metadata);

    assert_eq!(summary, ReplaySummary { applied: 1, failed: 1 });
    let style = &instance.map.style;
    assert_eq!(style.layers.len(), 2);
    assert_eq!(
        style.json["sprite"],
        json!(format!("file://{}", styles.join("sprite").display()))
    );

    let mut metadata = scenario(json!([["setStyle", {"version": 8, "layers": []}]]));
    OperationInterpreter::new(&mut instance, &resolver).run(&mut metadata);
    assert!(instance.map.style.layers.is_empty());
    assert_eq!(instance.map.style.loads, 2);
}
