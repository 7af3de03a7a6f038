//! `kiln inspect`: validates a compiled binary and summarizes it.

use std::fmt::Write as _;

use kiln_codegen::{validate_binary, Code, ShaderBinary};

use crate::{GlobalArgs, InspectArgs, ReportFormat};

/// Runs the `kiln inspect` command.
///
/// Returns exit code 0 if the binary is valid, 1 otherwise.
pub fn run(args: &InspectArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let bytes = std::fs::read(&args.binary)
        .map_err(|e| format!("cannot read {}: {e}", args.binary.display()))?;

    let binary = match validate_binary(&bytes) {
        Ok(binary) => binary,
        Err(err) => {
            eprintln!("error: {}: {err}", args.binary.display());
            return Ok(1);
        }
    };

    match args.format {
        ReportFormat::Text => {
            if !global.quiet {
                print!("{}", summarize(&binary, bytes.len()));
            }
        }
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&binary)?),
    }
    Ok(0)
}

/// Formats a human-readable summary of a valid binary.
pub fn summarize(binary: &ShaderBinary, size: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "entry point: {} ({})", binary.entry_point, binary.stage);
    let _ = writeln!(out, "size:        {size} bytes");
    if let Some([x, y, z]) = binary.workgroup_size {
        let _ = writeln!(out, "workgroup:   {x} x {y} x {z}");
    }

    let flags = &binary.flags;
    let enabled: Vec<&str> = [
        (flags.robust_buffer_access, "robust-buffer-access"),
        (flags.zero_initialize_workgroup_memory, "zero-workgroup-memory"),
        (flags.pass_matrix_by_pointer, "matrix-by-pointer"),
        (flags.subgroup_uniform_control_flow, "subgroup-uniform-control-flow"),
        (flags.clamp_frag_depth, "clamp-frag-depth"),
        (flags.emit_point_size, "point-size"),
    ]
    .into_iter()
    .filter_map(|(on, name)| on.then_some(name))
    .collect();
    if !enabled.is_empty() {
        let _ = writeln!(out, "flags:       {}", enabled.join(", "));
    }

    match &binary.code {
        Code::Structured { functions, entry } => {
            let _ = writeln!(
                out,
                "code:        structured, {} helper(s), {} entry statement(s)",
                functions.len(),
                entry.len()
            );
        }
        Code::Lowered(module) => {
            let instrs: usize = module.functions.iter().map(|f| f.code.len()).sum();
            let _ = writeln!(
                out,
                "code:        lowered, {} function(s), {instrs} instruction(s)",
                module.functions.len()
            );
        }
    }

    let _ = writeln!(out, "bindings:    {}", binary.bindings.len());
    for bound in &binary.bindings {
        let slots: Vec<String> = bound.slots.iter().map(u32::to_string).collect();
        let _ = writeln!(
            out,
            "  {:<20} {:<26} slot {}",
            bound.name,
            bound.kind.to_string(),
            slots.join(", ")
        );
    }
    out
}
