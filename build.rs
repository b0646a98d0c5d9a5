// Build script to compile GLSL shaders to SPIR-V
//
// Output goes to OUT_DIR so `shader!` can embed it. When glslc is not
// installed an empty file is written instead; loading such a shader fails at
// runtime with a message pointing at the missing compiler.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

const SHADERS: &[&str] = &[
    "triangle.vert",
    "triangle.frag",
    "vertex_color.vert",
    "vertex_color.frag",
    "textured.vert",
    "textured.frag",
];

fn main() {
    println!("cargo:rerun-if-changed=shaders/");

    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));

    for name in SHADERS {
        let input = Path::new("shaders").join(name);
        let output = out_dir.join(format!("{}.spv", name));
        compile_shader(&input, &output);
    }
}

fn compile_shader(input: &Path, output: &Path) {
    // Check if glslc is available
    let result = Command::new("glslc")
        .arg(input)
        .arg("-o")
        .arg(output)
        .status();

    match result {
        Ok(status) if status.success() => {}
        Ok(status) => {
            panic!("Failed to compile {}: exit code {:?}", input.display(), status.code());
        }
        Err(e) => {
            println!(
                "cargo:warning=glslc not found ({}); {} will fail to load at runtime",
                e,
                input.display()
            );
            fs::write(output, b"").expect("write placeholder shader");
        }
    }
}
