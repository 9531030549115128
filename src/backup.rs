use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::db::DB_FILE_NAME;

const MANIFEST_ENTRY: &str = "manifest.json";
const DB_ENTRY: &str = "db/bulletin.sqlite3";
pub const BUNDLE_FORMAT: &str = "bulletind-workspace-v1";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Manifest {
    format: String,
    #[serde(default)]
    app_version: String,
    #[serde(default)]
    exported_at: String,
    db_sha256: String,
    #[serde(default)]
    db_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub db_sha256: String,
    pub db_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
    pub db_sha256: String,
}

/// Copies `src` into `dst` and returns the hex SHA-256 and byte count of what went through.
fn copy_hashed(src: &mut impl Read, dst: &mut impl Write) -> io::Result<(String, u64)> {
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    let mut total = 0u64;
    loop {
        let n = src.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        dst.write_all(&buf[..n])?;
        total += n as u64;
    }
    Ok((format!("{:x}", hasher.finalize()), total))
}

fn digest_of(path: &Path) -> anyhow::Result<(String, u64)> {
    let mut f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    copy_hashed(&mut f, &mut io::sink()).with_context(|| format!("read {}", path.display()))
}

pub fn export_workspace_bundle(workspace: &Path, out_path: &Path) -> anyhow::Result<ExportSummary> {
    let db_path = workspace.join(DB_FILE_NAME);
    if !db_path.is_file() {
        bail!("workspace database not found: {}", db_path.display());
    }
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }

    let (db_sha256, db_bytes) = digest_of(&db_path)?;
    let manifest = Manifest {
        format: BUNDLE_FORMAT.to_string(),
        app_version: env!("CARGO_PKG_VERSION").to_string(),
        exported_at: chrono::Utc::now().to_rfc3339(),
        db_sha256: db_sha256.clone(),
        db_bytes,
    };

    let out = File::create(out_path).with_context(|| format!("create {}", out_path.display()))?;
    let mut zip = ZipWriter::new(out);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);
    zip.start_file(MANIFEST_ENTRY, opts)?;
    serde_json::to_writer_pretty(&mut zip, &manifest).context("write manifest")?;
    zip.start_file(DB_ENTRY, opts)?;
    let mut db = File::open(&db_path).with_context(|| format!("open {}", db_path.display()))?;
    io::copy(&mut db, &mut zip).context("write database entry")?;
    zip.finish().context("finish bundle")?;

    Ok(ExportSummary {
        bundle_format: manifest.format,
        db_sha256,
        db_bytes,
    })
}

fn read_manifest(archive: &mut ZipArchive<File>) -> anyhow::Result<Manifest> {
    let entry = archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle has no manifest.json")?;
    let manifest: Manifest = serde_json::from_reader(entry).context("manifest.json is invalid")?;
    if manifest.format != BUNDLE_FORMAT {
        bail!("unsupported bundle format: {}", manifest.format);
    }
    Ok(manifest)
}

/// Restores a bundle into `workspace`. The caller closes the connection first.
/// The current database is only replaced once the extracted copy matches the manifest digest.
pub fn import_workspace_bundle(in_path: &Path, workspace: &Path) -> anyhow::Result<ImportSummary> {
    let file = File::open(in_path).with_context(|| format!("open {}", in_path.display()))?;
    let mut archive = ZipArchive::new(file).context("not a zip bundle")?;
    let manifest = read_manifest(&mut archive)?;

    std::fs::create_dir_all(workspace).with_context(|| format!("create {}", workspace.display()))?;
    let staged = workspace.join(format!("{DB_FILE_NAME}.importing"));
    let extracted = {
        let mut entry = archive.by_name(DB_ENTRY).context("bundle has no database entry")?;
        let mut out =
            File::create(&staged).with_context(|| format!("create {}", staged.display()))?;
        copy_hashed(&mut entry, &mut out).and_then(|r| out.sync_all().map(|_| r))
    };
    let actual = match extracted {
        Ok((digest, _)) => digest,
        Err(e) => {
            let _ = std::fs::remove_file(&staged);
            return Err(e).context("extract database entry");
        }
    };
    if !actual.eq_ignore_ascii_case(&manifest.db_sha256) {
        let _ = std::fs::remove_file(&staged);
        bail!(
            "database digest mismatch: manifest {} but extracted {}",
            manifest.db_sha256,
            actual
        );
    }

    let dst = workspace.join(DB_FILE_NAME);
    std::fs::rename(&staged, &dst).with_context(|| format!("replace {}", dst.display()))?;
    Ok(ImportSummary {
        bundle_format_detected: manifest.format,
        db_sha256: actual,
    })
}
