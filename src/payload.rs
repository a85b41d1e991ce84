//! Upload fixtures: random payloads in memory or spooled to temp files.

use bytes::Bytes;
use rand::RngCore;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::error::{BenchError, Result};

pub const KIB: u64 = 1024;
pub const MIB: u64 = 1024 * KIB;
pub const GIB: u64 = 1024 * MIB;

const WRITE_CHUNK: u64 = MIB;

/// Generate `size` random bytes in a freshly allocated buffer
pub fn generate(size: usize) -> Bytes {
    let mut buf = vec![0u8; size];
    rand::thread_rng().fill_bytes(&mut buf);
    Bytes::from(buf)
}

/// Random payload written to a temporary file, removed on drop
#[derive(Debug)]
pub struct PayloadFile {
    file: NamedTempFile,
    size: u64,
}

impl PayloadFile {
    /// Create a temp file holding `size` random bytes
    pub fn generate(size: u64) -> Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix("cas-bench-")
            .suffix(".bin")
            .tempfile()?;

        let mut remaining = size;
        while remaining > 0 {
            let chunk = generate(remaining.min(WRITE_CHUNK) as usize);
            file.write_all(&chunk)?;
            remaining -= chunk.len() as u64;
        }
        file.flush()?;

        Ok(Self { file, size })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Base name used as the multipart filename
    pub fn file_name(&self) -> String {
        file_name_of(self.path())
    }

    /// Read the whole payload back into memory
    pub async fn read(&self) -> Result<Bytes> {
        let data = tokio::fs::read(self.path()).await?;
        Ok(Bytes::from(data))
    }
}

/// Where an upload's bytes come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadSource {
    /// Fresh random bytes of the given length, regenerated per iteration
    Generated(u64),
    /// An existing file on disk
    File(PathBuf),
}

impl PayloadSource {
    /// Human-readable label for progress output
    pub fn label(&self) -> String {
        match self {
            PayloadSource::Generated(size) => format!("random {}", format_size(*size)),
            PayloadSource::File(path) => path.display().to_string(),
        }
    }
}

/// Load an existing file as an upload payload, returning (filename, bytes)
pub async fn load_file(path: &Path) -> Result<(String, Bytes)> {
    let data = tokio::fs::read(path)
        .await
        .map_err(|e| BenchError::Io(format!("{}: {}", path.display(), e)))?;
    Ok((file_name_of(path), Bytes::from(data)))
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "payload.bin".to_string())
}

/// Parse sizes like `512`, `64K`, `10M`, `2G` (binary multiples)
pub fn parse_size(s: &str) -> std::result::Result<u64, String> {
    let s = s.trim();
    let upper = s.to_ascii_uppercase();
    let trimmed = upper
        .strip_suffix("IB")
        .or_else(|| upper.strip_suffix('B'))
        .unwrap_or(&upper);

    let (digits, multiplier) = match trimmed.chars().last() {
        Some('K') => (&trimmed[..trimmed.len() - 1], KIB),
        Some('M') => (&trimmed[..trimmed.len() - 1], MIB),
        Some('G') => (&trimmed[..trimmed.len() - 1], GIB),
        _ => (trimmed, 1),
    };

    let value: u64 = digits
        .trim()
        .parse()
        .map_err(|_| format!("Invalid size: {}", s))?;
    value
        .checked_mul(multiplier)
        .ok_or_else(|| format!("Size too large: {}", s))
}

/// Render a byte count using the largest whole binary unit
pub fn format_size(bytes: u64) -> String {
    if bytes >= GIB && bytes % GIB == 0 {
        format!("{}GB", bytes / GIB)
    } else if bytes >= MIB && bytes % MIB == 0 {
        format!("{}MB", bytes / MIB)
    } else if bytes >= KIB && bytes % KIB == 0 {
        format!("{}KB", bytes / KIB)
    } else {
        format!("{}B", bytes)
    }
}
