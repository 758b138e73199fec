//! The hosting sequence: find the runtime, build the TPA list, start the
//! runtime, run the entry assembly.

use anyhow::{bail, Context};
use monohost::{DomainHandle, VmSession};
use std::path::{Path, PathBuf};

use crate::config::HostConfig;

/// Initialization property listing assemblies the runtime may load
pub const TPA_PROPERTY: &str = "TRUSTED_PLATFORM_ASSEMBLIES";

/// Every `*.dll` directly inside `app_dir`, sorted.
pub fn tpa_list(app_dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let pattern = Path::new(&glob::Pattern::escape(&app_dir.to_string_lossy())).join("*.dll");
    let mut files: Vec<PathBuf> = glob::glob(&pattern.to_string_lossy())?
        .flatten()
        .filter(|path| path.is_file())
        .collect();
    files.sort();
    Ok(files)
}

/// Join paths with the platform's path-list separator.
pub fn join_path_list(paths: &[PathBuf]) -> anyhow::Result<String> {
    let joined = std::env::join_paths(paths).context("Assembly path contains a path separator")?;
    joined
        .into_string()
        .map_err(|raw| anyhow::anyhow!("Assembly path list is not valid UTF-8: {:?}", raw))
}

/// Initialization properties: the TPA list first, then the configured ones.
pub fn properties(tpa: String, config: &HostConfig) -> Vec<(String, String)> {
    std::iter::once((TPA_PROPERTY.to_string(), tpa))
        .chain(config.properties.iter().map(|p| (p.key.clone(), p.value.clone())))
        .collect()
}

/// Resolve a configured file against the application directory.
pub fn resolve_in(app_dir: &Path, file: &str) -> PathBuf {
    // An absolute `file` replaces `app_dir`
    app_dir.join(file)
}

/// Initialize the runtime and create the root domain.
pub fn start_runtime(vm: &VmSession<'_>, tpa: &[PathBuf], config: &HostConfig) -> anyhow::Result<DomainHandle> {
    let props = properties(join_path_list(tpa)?, config);
    vm.initialize(&props)?;
    let domain = vm.start(&config.domain_name, &config.runtime_version)?;
    if domain.is_null() {
        bail!(
            "Runtime failed to create domain '{}' ({})",
            config.domain_name,
            config.runtime_version
        );
    }
    Ok(domain)
}

/// Open the entry assembly and execute it; returns the managed exit code.
pub fn run_entry(vm: &VmSession<'_>, domain: DomainHandle, app_dir: &Path, config: &HostConfig) -> anyhow::Result<i32> {
    let assembly_path = resolve_in(app_dir, &config.entry_assembly);
    let assembly_str = assembly_path
        .to_str()
        .with_context(|| format!("Assembly path is not valid UTF-8: {}", assembly_path.display()))?;
    let assembly = vm.open_assembly(domain, assembly_str)?;
    Ok(vm.execute(domain, assembly, &config.args)?)
}

/// Run the application in `app_dir` end to end.
pub fn run(app_dir: &Path, config: &HostConfig) -> anyhow::Result<i32> {
    if !app_dir.is_dir() {
        bail!("Directory not found: {}", app_dir.display());
    }

    let lib_path = resolve_in(app_dir, &config.runtime_library);
    if !lib_path.is_file() {
        bail!("File not found: {}", lib_path.display());
    }

    let tpa = tpa_list(app_dir)?;
    tracing::debug!(count = tpa.len(), "collected trusted platform assemblies");

    let host = monohost::make(&lib_path)?;
    let vm = host.vm()?;
    let domain = start_runtime(&vm, &tpa, config)?;
    println!("Mono started");

    let exit_code = run_entry(&vm, domain, app_dir, config)?;
    println!("Sample run complete");
    Ok(exit_code)
}
