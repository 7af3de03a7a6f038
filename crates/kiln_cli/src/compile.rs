//! `kiln compile`: compiles one variant of a program.
//!
//! 1. Resolve `kiln.toml` and build a software device from it
//! 2. Load the program and pipeline layout from JSON
//! 3. Open the blob store, if a directory is configured
//! 4. Request the variant, optionally from several threads at once
//! 5. Render diagnostics, write the binary, and print a summary

use std::path::{Path, PathBuf};

use kiln_blob::FileBlobStore;
use kiln_compile::{CacheEntry, CompileError, ProgrammableStage, ShaderModule, SoftwareDevice};
use rayon::prelude::*;

use crate::pipeline::{read_layout, read_program, render_diagnostics, resolve_config};
use crate::{CompileArgs, GlobalArgs};

/// Runs the `kiln compile` command.
///
/// Returns exit code 0 on success and 1 when the variant fails to compile.
pub fn run(args: &CompileArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let config = resolve_config(global)?;
    let device = SoftwareDevice::from_config(&config);

    let program = read_program(&args.program)?;
    let layout = read_layout(&args.layout)?;

    let blob_dir = args
        .blob_dir
        .clone()
        .or_else(|| config.cache.blob_dir.as_ref().map(PathBuf::from));
    let blob_store = blob_dir
        .as_deref()
        .map(|dir| FileBlobStore::new(dir, env!("CARGO_PKG_VERSION")));

    let module = match ShaderModule::new(&device, program) {
        Ok(module) => module,
        Err(err) => return Ok(report_failure(&err, global)),
    };
    let module = match &blob_store {
        Some(store) => module.with_blob_store(store),
        None => module,
    };

    let mut stage = ProgrammableStage::new(args.entry.as_str());
    for (name, value) in &args.constants {
        stage = stage.with_constant(name.as_str(), *value);
    }

    if !global.quiet {
        eprintln!(
            "   Compiling {} ({}) on {}",
            stage.entry_point,
            args.stage,
            config.device.name
        );
    }

    let compile = || {
        module.get_compiled_variant(
            args.stage.into(),
            &stage,
            &layout,
            args.clamp_frag_depth,
            args.emit_point_size,
            args.full_subgroups,
        )
    };

    let threads = usize::from(args.threads);
    let results: Vec<Result<CacheEntry, CompileError>> = if threads > 1 {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;
        pool.install(|| (0..threads).into_par_iter().map(|_| compile()).collect())
    } else {
        vec![compile()]
    };

    render_diagnostics(&module.diagnostics().take_all(), global.color);

    let mut entry: Option<CacheEntry> = None;
    for result in results {
        match result {
            Ok(found) => {
                if let Some(previous) = &entry {
                    if previous.handle != found.handle {
                        return Err(format!(
                            "threads observed different modules: {} and {}",
                            previous.handle, found.handle
                        )
                        .into());
                    }
                }
                entry = Some(found);
            }
            Err(err) => return Ok(report_failure(&err, global)),
        }
    }
    let Some(entry) = entry else {
        return Err("no compilation was requested".into());
    };

    if let Some(output) = &args.output {
        write_output(output, &entry.binary)?;
    }

    if !global.quiet {
        let cache = module.cache().stats();
        eprintln!(
            "   Compiled {} -> {} ({} bytes, {})",
            stage.entry_point,
            entry.remapped_entry_point,
            entry.binary.len(),
            entry.handle
        );
        if entry.has_input_attachment {
            eprintln!("   Uses an input attachment");
        }
        if global.verbose {
            let stats = device.stats();
            eprintln!(
                "   Cache: {} hit(s), {} miss(es), {} lost race(s); device: {} created, {} discarded",
                cache.hits, cache.misses, cache.lost_races, stats.created, stats.destroyed_immediately
            );
        }
    }

    drop(module);
    let retired = device.wait_idle();
    tracing::debug!(retired, "device idle");
    Ok(0)
}

fn report_failure(err: &CompileError, global: &GlobalArgs) -> i32 {
    match err.diagnostic() {
        Some(diag) => {
            render_diagnostics(std::slice::from_ref(diag), global.color);
        }
        None => eprintln!("error: {err}"),
    }
    1
}

fn write_output(path: &Path, binary: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, binary).map_err(|e| format!("cannot write {}: {e}", path.display()))?;
    Ok(())
}
