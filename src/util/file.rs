use bytes::Bytes;
use log::warn;
use std::fs::{self, File};
use std::io::{Error, ErrorKind, Read, Result};
use std::path::Path;

pub fn sanity_check<P: AsRef<Path>>(path: P) -> Result<(u64, String)> {
    let metadata = fs::metadata(&path)?;
    let file_name = metadata
        .is_file()
        .then_some(path.as_ref().file_name())
        .flatten()
        .ok_or(Error::new(
            ErrorKind::IsADirectory,
            "A normal file is expected.",
        ))?
        .to_string_lossy()
        .into_owned();

    Ok((metadata.len(), file_name))
}

/// Reads at most `max_len` bytes from the start of the file.
pub fn read_payload<P: AsRef<Path>>(path: P, max_len: usize) -> Result<Bytes> {
    let (length, file_name) = sanity_check(&path)?;
    if length > max_len as u64 {
        warn!("{file_name} has {length} bytes, only the first {max_len} are sent");
    }

    let mut payload = Vec::with_capacity((length as usize).min(max_len));
    File::open(&path)?
        .take(max_len as u64)
        .read_to_end(&mut payload)?;
    Ok(payload.into())
}

/// Creates missing parent directories, then replaces the file.
pub fn write_output<P: AsRef<Path>>(path: P, data: &[u8]) -> Result<()> {
    let path = path.as_ref();
    if path.is_dir() {
        return Err(Error::new(
            ErrorKind::IsADirectory,
            "The output path is a directory.",
        ));
    }
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, data)
}
