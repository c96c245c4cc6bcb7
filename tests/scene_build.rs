//! Scene construction from JSON and OBJ assets, rendered on the CPU backend.

use std::fs;

use redflash::accumulation::{run_batch, BatchPlan, ManualClock};
use redflash::backend::CpuBackend;
use redflash::output::ImageWriter;
use redflash::scene::{AssetResolver, ObjImporter, SceneSpec, ShapeKind};
use redflash::session::RenderSession;
use redflash::Error;

use tempfile::TempDir;

const QUAD_OBJ: &str = "\
v -1 -1 0
v 1 -1 0
v 1 1 0
v -1 1 0
vn 0 0 1
f 1//1 2//1 3//1 4//1
";

/// Temp working directory with `quad.obj` under `data/`.
fn workspace() -> TempDir {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    fs::create_dir(dir.path().join("data")).unwrap();
    fs::write(dir.path().join("data").join("quad.obj"), QUAD_OBJ).unwrap();
    dir
}

fn quad_scene() -> SceneSpec {
    SceneSpec::from_json(
        r#"{
            "camera": { "eye": [0, 0, 5], "lookat": [0, 0, 0], "fov": 35 },
            "render": { "max_depth": 3, "sample_per_launch": 1 },
            "primitives": [
                { "kind": "mesh", "path": "quad.obj", "albedo": [1, 0, 0] }
            ],
            "lights": [
                { "kind": "sphere", "position": [0, 2, 3], "radius": 0.5, "emission": [5, 5, 5] }
            ]
        }"#,
    )
    .expect("valid scene")
}

#[test]
fn test_mesh_resolved_from_data_dir() {
    let dir = workspace();
    let resolver = AssetResolver::new(dir.path(), None);
    let session = RenderSession::new(CpuBackend::new(), &quad_scene(), 16, 16, &ObjImporter, &resolver).unwrap();

    let scene = session.scene();
    assert_eq!(scene.opaque.len(), 1);
    let group = &scene.opaque[0];
    assert_eq!(group.name(), "triangles");
    assert_eq!(group.instances()[0].kind(), ShapeKind::TriangleMesh);
    assert!(scene.lights_group.is_some());
    assert_eq!(scene.instance_count(), 2);
}

#[test]
fn test_cpu_render_shades_mesh_and_sky() {
    let dir = workspace();
    let resolver = AssetResolver::new(dir.path(), None);
    let mut session = RenderSession::new(CpuBackend::new(), &quad_scene(), 16, 16, &ObjImporter, &resolver).unwrap();

    for expected in 1..=4 {
        assert_eq!(session.render_frame().unwrap(), expected);
    }

    let output = session.output();
    assert!(output.pixels().iter().flatten().all(|c| c.is_finite()));

    // Red diffuse quad in the middle, sky in the corner
    let center = output.pixel(8, 8);
    assert!(center[0] > 0.0);
    assert_eq!(center[1], 0.0);
    let corner = output.pixel(0, 0);
    assert!(corner[1] > 0.1);
}

#[test]
fn test_batch_writes_png() {
    let dir = workspace();
    let resolver = AssetResolver::new(dir.path(), None);
    let mut session = RenderSession::new(CpuBackend::new(), &quad_scene(), 12, 8, &ObjImporter, &resolver).unwrap();
    let out = dir.path().join("render.png");

    let report = run_batch(&mut session, &BatchPlan::samples(3), &ManualClock::new(), &mut ImageWriter::new(), &out).unwrap();

    assert_eq!(report.samples, 3);
    let img = image::open(&out).unwrap();
    assert_eq!((img.width(), img.height()), (12, 8));
}

#[test]
fn test_scene_file_with_unknown_kind() {
    let dir = workspace();
    let path = dir.path().join("scene.json");
    fs::write(&path, r#"{ "primitives": [ { "kind": "torus", "radius": 1 } ] }"#).unwrap();

    assert!(matches!(SceneSpec::load(&path), Err(Error::InvalidScene(_))));
}

#[test]
fn test_malformed_mesh_is_import_error() {
    let dir = workspace();
    fs::write(dir.path().join("broken.obj"), "f 1 2 3\n").unwrap();
    let mut spec = quad_scene();
    spec.primitives = serde_json::from_str(r#"[ { "kind": "mesh", "path": "broken.obj" } ]"#).unwrap();
    let resolver = AssetResolver::new(dir.path(), None);

    let result = RenderSession::new(CpuBackend::new(), &spec, 4, 4, &ObjImporter, &resolver);
    assert!(matches!(result, Err(Error::MeshImport { .. })));
}

#[test]
fn test_default_scene_needs_assets() {
    let dir = tempfile::tempdir().unwrap();
    let resolver = AssetResolver::new(dir.path(), None);
    let result = RenderSession::new(
        CpuBackend::new(),
        &SceneSpec::default_scene(),
        8,
        8,
        &ObjImporter,
        &resolver,
    );
    match result {
        Err(Error::ResourceNotFound { name, searched }) => {
            assert_eq!(name, "cow.obj");
            assert_eq!(searched, vec![dir.path().join("cow.obj"), dir.path().join("data").join("cow.obj")]);
        }
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("setup should fail"),
    }
}
