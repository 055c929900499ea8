//! End-to-end tests for the `alphaearth` binary.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use alphaearth_raster::{DataType, GeoTransform, Raster, RasterData, RasterProfile};
use tempfile::TempDir;

fn alphaearth(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_alphaearth"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run alphaearth")
}

fn write_tile(dir: &Path, name: &str, origin_x: f64, values: Vec<f32>) -> PathBuf {
    let raster = Raster::new(
        RasterProfile {
            width: 2,
            height: 2,
            bands: values.len() / 4,
            dtype: DataType::Float32,
            transform: GeoTransform::new(origin_x, 38.0, 0.5, 0.5),
            crs: Some(4326),
            nodata: None,
        },
        RasterData::F32(values),
    )
    .unwrap();
    let path = dir.join(name);
    raster.write(&path).unwrap();
    path
}

fn tile_dir(temp: &TempDir) -> PathBuf {
    let dir = temp.path().join("2024");
    std::fs::create_dir(&dir).unwrap();
    write_tile(&dir, "float32_a.tif", 30.0, vec![0.25; 8]);
    write_tile(&dir, "float32_b.tif", 31.0, vec![-0.5; 8]);
    dir
}

#[test]
fn test_merge_directory_default_output() {
    let temp = TempDir::new().unwrap();
    let dir = tile_dir(&temp);

    let output = alphaearth(&["merge", dir.to_str().unwrap()]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let merged = temp.path().join("2024.tif");
    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["inputs"], 2);
    assert_eq!(summary["width"], 4);
    assert_eq!(PathBuf::from(summary["output"].as_str().unwrap()), merged);

    let raster = Raster::open(&merged).unwrap();
    assert_eq!(raster.profile().bands, 2);
    assert!(dir.exists());
}

#[test]
fn test_merge_files_requires_output_path() {
    let temp = TempDir::new().unwrap();
    let dir = tile_dir(&temp);

    let output = alphaearth(&["merge", dir.to_str().unwrap(), "--method", "files"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("--output-path"));
    assert!(!temp.path().join("2024.tif").exists());
}

#[test]
fn test_merge_files_with_delete_after() {
    let temp = TempDir::new().unwrap();
    let dir = tile_dir(&temp);
    let out = temp.path().join("mosaic.tif");

    let output = alphaearth(&[
        "merge",
        dir.to_str().unwrap(),
        "--method",
        "files",
        "--output-path",
        out.to_str().unwrap(),
        "--delete-after",
    ]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(out.exists());
    // The file list is deleted, the directory itself stays
    assert!(dir.exists());
    assert!(!dir.join("float32_a.tif").exists());
}

#[test]
fn test_merge_missing_directory_fails() {
    let temp = TempDir::new().unwrap();
    let missing = temp.path().join("absent");
    let output = alphaearth(&["merge", missing.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(!output.stderr.is_empty());
}

#[test]
fn test_quantize_then_dequantize() {
    let temp = TempDir::new().unwrap();
    let source = write_tile(temp.path(), "float.tif", 30.0, vec![0.25; 4]);
    let quantized = temp.path().join("uint8.tif");
    let restored = temp.path().join("restored.tif");

    let output = alphaearth(&[
        "quantize",
        source.to_str().unwrap(),
        quantized.to_str().unwrap(),
    ]);
    assert!(output.status.success());
    let bytes = Raster::open(&quantized).unwrap();
    assert_eq!(bytes.profile().dtype, DataType::Uint8);
    assert_eq!(bytes.data(), &RasterData::U8(vec![191; 4]));

    let output = alphaearth(&[
        "dequantize",
        quantized.to_str().unwrap(),
        restored.to_str().unwrap(),
    ]);
    assert!(output.status.success());
    let floats = Raster::open(&restored).unwrap();
    assert_eq!(floats.profile().dtype, DataType::Float32);
    let value = floats.pixel(0, 0).unwrap()[0];
    assert!((value - 0.25).abs() < 2.0 / 127.5);

    // Quantizing bytes again is rejected
    let output = alphaearth(&[
        "quantize",
        quantized.to_str().unwrap(),
        restored.to_str().unwrap(),
    ]);
    assert!(!output.status.success());
}

#[test]
fn test_info_prints_profile() {
    let temp = TempDir::new().unwrap();
    let source = write_tile(temp.path(), "float.tif", 30.0, vec![0.1; 12]);

    let output = alphaearth(&["info", source.to_str().unwrap()]);
    assert!(output.status.success());
    let profile: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(profile["bands"], 3);
    assert_eq!(profile["dtype"], "float32");
    assert_eq!(profile["crs"], 4326);
}

#[test]
fn test_plan_lists_tile_names() {
    let output = alphaearth(&[
        "plan",
        "--min-lat",
        "36.7",
        "--max-lat",
        "36.71",
        "--min-lon",
        "31.2",
        "--max-lon",
        "31.21",
        "--dtype",
        "uint8",
        "--prefix",
        "ankara",
    ]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(plan["crs"], "EPSG:4326");
    assert_eq!(
        plan["tiles"],
        serde_json::json!(["ankara_uint8_[36.700|36.710|31.200|31.210].tif"])
    );
}

#[test]
fn test_plan_rejects_invalid_arguments() {
    let base = ["plan", "--min-lat", "0", "--max-lat", "1", "--min-lon", "0", "--max-lon", "1"];

    let mut args = base.to_vec();
    args.extend(["--scale", "5"]);
    assert!(!alphaearth(&args).status.success());

    let mut args = base.to_vec();
    args.extend(["--year", "2016"]);
    assert!(!alphaearth(&args).status.success());

    let mut args = base.to_vec();
    args.extend(["--dtype", "uint16"]);
    assert!(!alphaearth(&args).status.success());
}

#[test]
fn test_config_file_sets_plan_defaults() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("config.yaml");
    std::fs::write(&config, "dtype: float64\nscale: 100\n").unwrap();

    let output = alphaearth(&[
        "--config",
        config.to_str().unwrap(),
        "plan",
        "--min-lat",
        "0",
        "--max-lat",
        "0.01",
        "--min-lon",
        "0",
        "--max-lon",
        "0.01",
    ]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let name = plan["tiles"][0].as_str().unwrap();
    assert!(name.starts_with("float64_"));
}
