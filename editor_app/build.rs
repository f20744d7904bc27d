// Compiles resources/shaders/<name>.<stage> into shaders/<stage>.spv,
// the paths the default configuration loads.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

const STAGES: [&str; 2] = ["vert", "frag"];

fn glslc() -> Option<PathBuf> {
    println!("cargo:rerun-if-env-changed=VULKAN_SDK");
    let sdk = env::var("VULKAN_SDK").ok()?;
    let path = if cfg!(target_os = "windows") {
        PathBuf::from(sdk).join("Bin").join("glslc.exe")
    } else {
        PathBuf::from(sdk).join("bin").join("glslc")
    };
    path.exists().then_some(path)
}

fn is_stale(source: &Path, output: &Path) -> bool {
    let modified = |path: &Path| std::fs::metadata(path).and_then(|meta| meta.modified()).ok();
    match (modified(source), modified(output)) {
        (Some(source), Some(output)) => source > output,
        _ => true,
    }
}

fn main() {
    println!("cargo:rerun-if-changed=../resources/shaders");

    if env::var("SKIP_SHADERS").is_ok() {
        println!("cargo:warning=SKIP_SHADERS set, shader compilation skipped");
        return;
    }
    let Some(compiler) = glslc() else {
        println!("cargo:warning=glslc not found (set VULKAN_SDK), shader compilation skipped");
        return;
    };

    let source_dir = Path::new("../resources/shaders");
    let output_dir = Path::new("../shaders");
    if let Err(e) = std::fs::create_dir_all(output_dir) {
        println!("cargo:warning=Failed to create {}: {}", output_dir.display(), e);
        return;
    }

    let Ok(entries) = std::fs::read_dir(source_dir) else {
        println!("cargo:warning=No shader directory at {}", source_dir.display());
        return;
    };

    for path in entries.filter_map(Result::ok).map(|entry| entry.path()) {
        let Some(stage) = path.extension().and_then(|ext| ext.to_str()) else {
            continue;
        };
        if !STAGES.contains(&stage) {
            continue;
        }

        let output = output_dir.join(stage).with_extension("spv");
        if !is_stale(&path, &output) {
            continue;
        }

        let status = Command::new(&compiler).arg(&path).arg("-o").arg(&output).status();
        match status {
            Ok(status) if status.success() => {}
            Ok(status) => panic!("glslc failed for {} with {}", path.display(), status),
            Err(e) => panic!("Failed to run glslc for {}: {}", path.display(), e),
        }
    }
}
