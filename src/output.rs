use std::io::{self, Write};

use serde::Serialize;

use crate::app::{
    AddResult, DeleteResult, DownloadResult, InspectResult, RemoveResult, RemovedKind,
    StatusResult,
};
use crate::collector::{ProgressEvent, ProgressSink};
use crate::dataset::EntrySource;
use crate::domain::CatalogEntry;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Text,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

pub struct TextOutput;

impl TextOutput {
    pub fn print_add(result: &AddResult) -> io::Result<()> {
        let mut out = io::stdout().lock();
        if result.catalog_fetched {
            let size = result
                .catalog_size
                .map(|bytes| format!(" ({bytes} bytes)"))
                .unwrap_or_default();
            writeln!(out, "[*] Downloaded data list {}{size}", result.catalog_id)?;
        } else {
            writeln!(out, "[*] Reusing data list {}", result.catalog_id)?;
        }
        writeln!(out, "[*] Created dataset {} ({})", result.name, result.dataset_id)
    }

    pub fn print_remove(result: &RemoveResult) -> io::Result<()> {
        let mut out = io::stdout().lock();
        match result.kind {
            RemovedKind::Dataset => {
                let name = result.name.as_deref().unwrap_or("?");
                writeln!(out, "[*] Removed dataset {name} ({})", result.id)?;
                if result.catalog_removed {
                    writeln!(out, "[*] Removed its data list, no other dataset used it")?;
                } else if result.catalog_unused {
                    writeln!(
                        out,
                        "[!] Its data list is no longer used by any dataset (pass --prune-list to remove it)"
                    )?;
                }
                Ok(())
            }
            RemovedKind::Catalog => writeln!(out, "[*] Removed data list {}", result.id),
        }
    }

    pub fn print_inspect(result: &InspectResult) -> io::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "-- Datasets")?;
        if result.datasets.is_empty() {
            writeln!(out, "There are no datasets")?;
        }
        for dataset in &result.datasets {
            let entries = dataset
                .entries
                .map(|count| count.to_string())
                .unwrap_or_else(|| "missing".to_string());
            writeln!(
                out,
                "{:<24} {}  list={}  files={entries}",
                dataset.name, dataset.id, dataset.catalog_id
            )?;
        }
        writeln!(out, "-- Data lists")?;
        if result.catalogs.is_empty() {
            writeln!(out, "There are no data lists")?;
        }
        for catalog in &result.catalogs {
            let used_in = if catalog.used_in.is_empty() {
                "-".to_string()
            } else {
                catalog.used_in.join(", ")
            };
            writeln!(out, "{}  used in: {used_in}", catalog.id)?;
        }
        if !result.untracked.is_empty() {
            writeln!(out, "-- Untracked dataset directories")?;
            for id in &result.untracked {
                writeln!(out, "{id}")?;
            }
        }
        Ok(())
    }

    pub fn print_status(result: &StatusResult) -> io::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{} ({})", result.name, result.dataset_id)?;
        writeln!(out, "Available files   {}", result.available)?;
        writeln!(out, "Downloaded files  {}", result.downloaded)?;
        writeln!(out, "Missing files     {}", result.missing)
    }

    pub fn print_download(result: &DownloadResult) -> io::Result<()> {
        let mut out = io::stdout().lock();
        let copied = result
            .completed
            .iter()
            .filter(|outcome| outcome.source == EntrySource::Copied)
            .count();
        writeln!(
            out,
            "[*] {} of {} files stored in {} ({copied} copied from other datasets)",
            result.completed.len(),
            result.requested,
            result.name
        )?;
        for failure in &result.failures {
            writeln!(out, "[X] {}: {}", failure.path, failure.error)?;
        }
        if result.cancelled {
            writeln!(out, "[!] Cancelled before all files were stored")?;
        }
        Ok(())
    }

    pub fn print_delete(result: &DeleteResult) -> io::Result<()> {
        let mut out = io::stdout().lock();
        for id in &result.removed {
            writeln!(out, "[*] Removed {id}")?;
        }
        writeln!(out, "[*] {} files removed from {}", result.removed.len(), result.name)
    }

    pub fn print_entries(entries: &[CatalogEntry]) -> io::Result<()> {
        let mut out = io::stdout().lock();
        for entry in entries {
            writeln!(out, "{entry}")?;
        }
        Ok(())
    }
}

pub struct ConsoleSink;

impl ProgressSink for ConsoleSink {
    fn event(&self, event: ProgressEvent) {
        let time = chrono::Local::now().format("%H:%M:%S");
        let verb = match event.source {
            EntrySource::Downloaded => "Downloaded",
            EntrySource::Copied => "Copied",
            EntrySource::AlreadyPresent => "Kept",
        };
        eprintln!(
            "[{time}] {verb} {} ({} bytes) [{}/{}]",
            event.id, event.bytes, event.completed, event.total
        );
    }
}
