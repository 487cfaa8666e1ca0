use std::io::Write;
use std::path::Path;

use mw_core::Pattern;
use mw_storage::settings::OPEN_WINDOWS_KEY;
use mw_storage::{load_patterns, set_flag, Cache, ExclusionService, Flag, JsonFileStore, Settings};

/// Optional fields of a pattern given on the command line.
#[derive(Debug, Default, Clone)]
pub struct PatternFields {
    pub scheme: Option<String>,
    pub port: Option<String>,
    pub path: Option<String>,
}

impl PatternFields {
    fn build(self, domain: &str) -> Pattern {
        let mut pattern = Pattern::new(domain);
        if let Some(scheme) = self.scheme {
            pattern = pattern.with_scheme(scheme);
        }
        if let Some(port) = self.port {
            pattern = pattern.with_port(port);
        }
        if let Some(path) = self.path {
            pattern = pattern.with_path(path);
        }
        pattern
    }
}

fn write_err(e: std::io::Error) -> String {
    format!("Failed to write output: {}", e)
}

async fn open_service(path: &Path) -> Result<ExclusionService<JsonFileStore>, String> {
    let service = ExclusionService::new(JsonFileStore::new(path));
    service
        .load()
        .await
        .map_err(|e| format!("Failed to load exclusion list from '{}': {}", path.display(), e))?;
    Ok(service)
}

pub async fn cmd_list(path: &Path, out: &mut impl Write) -> Result<(), String> {
    let service = open_service(path).await?;
    let patterns = service.patterns();
    if patterns.is_empty() {
        writeln!(out, "No exclusions").map_err(write_err)?;
        return Ok(());
    }
    for (index, pattern) in patterns.iter().enumerate() {
        writeln!(out, "{:>4}  {}", index, pattern).map_err(write_err)?;
    }
    Ok(())
}

pub async fn cmd_add(path: &Path, domain: &str, fields: PatternFields, out: &mut impl Write) -> Result<(), String> {
    let service = open_service(path).await?;
    let pattern = fields.build(domain);
    let shown = pattern.to_string();
    let added = service
        .add(pattern)
        .await
        .map_err(|e| format!("Failed to add '{}': {}", shown, e))?;
    report_add(out, &shown, added)
}

pub async fn cmd_add_url(path: &Path, url: &str, out: &mut impl Write) -> Result<(), String> {
    let service = open_service(path).await?;
    let added = service
        .add_url(url)
        .await
        .map_err(|e| format!("Failed to add '{}': {}", url, e))?;
    report_add(out, url, added)
}

fn report_add(out: &mut impl Write, shown: &str, added: bool) -> Result<(), String> {
    if added {
        writeln!(out, "Added {}", shown).map_err(write_err)
    } else {
        writeln!(out, "Already excluded: {}", shown).map_err(write_err)
    }
}

pub async fn cmd_remove(path: &Path, index: isize, out: &mut impl Write) -> Result<(), String> {
    let service = open_service(path).await?;
    let removed = service
        .remove_index(index)
        .await
        .map_err(|e| format!("Failed to remove entry {}: {}", index, e))?;
    match removed {
        Some(pattern) => writeln!(out, "Removed {}", pattern).map_err(write_err),
        None => writeln!(out, "No entry at index {} ({} entries)", index, service.len()).map_err(write_err),
    }
}

pub async fn cmd_check(path: &Path, urls: &[String], out: &mut impl Write) -> Result<(), String> {
    let service = open_service(path).await?;
    for url in urls {
        let verdict = if service.includes_url(url) { "excluded" } else { "not excluded" };
        writeln!(out, "{}  {}", verdict, url).map_err(write_err)?;
    }
    Ok(())
}

/// Load the list once so any legacy data is converted and written back.
pub async fn cmd_migrate(path: &Path, out: &mut impl Write) -> Result<(), String> {
    let cache = Cache::new(JsonFileStore::new(path));
    let patterns = load_patterns(&cache)
        .await
        .map_err(|e| format!("Failed to migrate '{}': {}", path.display(), e))?;
    writeln!(out, "Exclusion list in '{}' is current ({} entries)", path.display(), patterns.len())
        .map_err(write_err)
}

pub async fn cmd_settings_show(path: &Path, out: &mut impl Write) -> Result<(), String> {
    let cache = Cache::new(JsonFileStore::new(path));
    let settings = Settings::load(&cache)
        .await
        .map_err(|e| format!("Failed to read settings from '{}': {}", path.display(), e))?;

    for flag in Flag::ALL {
        writeln!(out, "{:<28} {}", flag.key(), settings.flag(flag)).map_err(write_err)?;
    }
    writeln!(out, "{:<28} {:?}", OPEN_WINDOWS_KEY, settings.open_windows_ids).map_err(write_err)
}

pub async fn cmd_settings_set(path: &Path, key: &str, value: bool, out: &mut impl Write) -> Result<(), String> {
    let flag: Flag = key.parse().map_err(|e: mw_storage::UnknownFlag| e.to_string())?;
    let cache = Cache::new(JsonFileStore::new(path));
    set_flag(&cache, flag, value)
        .await
        .map_err(|e| format!("Failed to update '{}': {}", flag, e))?;
    writeln!(out, "{} = {}", flag, value).map_err(write_err)
}

/// Write every setting with its default value.
pub async fn cmd_settings_reset(path: &Path, out: &mut impl Write) -> Result<(), String> {
    let cache = Cache::new(JsonFileStore::new(path));
    Settings::default()
        .store(&cache)
        .await
        .map_err(|e| format!("Failed to write settings to '{}': {}", path.display(), e))?;
    writeln!(out, "Settings reset to defaults").map_err(write_err)
}
