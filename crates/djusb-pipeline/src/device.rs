//! Raw device detection and unmounting.

use std::path::Path;
use std::process::Command;
use tracing::info;

use crate::error::{PipelineError, PipelineResult};

/// Whether `path` names a raw disk rather than a regular file.
pub fn is_device_path(path: &Path) -> bool {
    let text = path.to_string_lossy();
    if cfg!(windows) {
        text.to_ascii_lowercase().starts_with(r"\\.\physicaldrive")
    } else {
        text.starts_with("/dev/")
    }
}

/// `name` is `dev` itself or one of its partitions (`sdb1`, `nvme0n1p2`,
/// `disk2s1`).
fn is_same_or_partition(name: &str, dev: &str) -> bool {
    match name.strip_prefix(dev) {
        Some("") => true,
        Some(rest) => {
            let digits = rest
                .strip_prefix(|c: char| c == 'p' || c == 's')
                .unwrap_or(rest);
            !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}

/// Mount points of `dev` and its partitions in `mount(8)` output.
///
/// Lines look like `/dev/sdb1 on /media/usb type vfat (rw,...)` on Linux and
/// `/dev/disk2s1 on /Volumes/USB (msdos, local)` on macOS.
pub fn parse_mount_table(output: &str, dev: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let (device, rest) = line.split_once(" on ")?;
            if !is_same_or_partition(device.trim(), dev) {
                return None;
            }
            let end = [rest.find(" type "), rest.find(" (")]
                .into_iter()
                .flatten()
                .min()
                .unwrap_or(rest.len());
            let mount_point = rest[..end].trim();
            (!mount_point.is_empty()).then(|| mount_point.to_string())
        })
        .collect()
}

/// Unmount every mounted partition of `dev`. A failing `umount` fails the
/// call; a device with nothing mounted is fine.
pub fn unmount_all(dev: &Path) -> PipelineResult<()> {
    if cfg!(windows) {
        return Ok(());
    }
    let dev = dev.to_string_lossy();

    let output = Command::new("mount")
        .output()
        .map_err(|e| PipelineError::Device(format!("running mount: {e}")))?;
    let table = String::from_utf8_lossy(&output.stdout);

    for mount_point in parse_mount_table(&table, &dev) {
        info!(device = %dev, mount_point = %mount_point, "unmounting");
        let status = Command::new("umount")
            .arg(&mount_point)
            .status()
            .map_err(|e| PipelineError::Device(format!("running umount {mount_point}: {e}")))?;
        if !status.success() {
            return Err(PipelineError::Device(format!(
                "umount {mount_point}: {status}"
            )));
        }
    }
    Ok(())
}
