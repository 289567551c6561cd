// Build script to compile the GLSL shaders to SPIR-V
//
// Output names match the default shader paths in config.toml.

use std::path::Path;
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=shaders/triangle.vert");
    println!("cargo:rerun-if-changed=shaders/triangle.frag");

    compile_shader("shaders/triangle.vert", "shaders/vert.spv");
    compile_shader("shaders/triangle.frag", "shaders/frag.spv");
}

fn compile_shader(input: &str, output: &str) {
    let input_path = Path::new(input);
    if !input_path.exists() {
        return;
    }

    // glslc ships with the Vulkan SDK
    let result = Command::new("glslc")
        .arg(input_path)
        .arg("-o")
        .arg(output)
        .status();

    match result {
        Ok(status) if status.success() => {}
        Ok(status) => {
            println!(
                "cargo:warning=Failed to compile {}: exit code {:?}",
                input,
                status.code()
            );
        }
        Err(e) => {
            println!("cargo:warning=glslc not found ({}), shaders not compiled", e);
            println!("cargo:warning=Compile manually: glslc {} -o {}", input, output);
        }
    }
}
