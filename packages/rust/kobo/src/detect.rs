//! Locate a mounted Kobo device by probing removable-media mount points.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

/// Location of the reader database relative to the device root.
pub const KOBO_DB_RELATIVE_PATH: &str = ".kobo/KoboReader.sqlite";

/// Directories whose immediate children are mounted volumes on this platform.
pub fn default_mount_roots() -> Vec<PathBuf> {
    let mut roots = Vec::new();

    if cfg!(target_os = "macos") {
        roots.push(PathBuf::from("/Volumes"));
    } else if cfg!(windows) {
        // Drive letters are volumes themselves, not mount roots.
        return ('D'..='Z').map(|letter| PathBuf::from(format!("{letter}:\\"))).collect();
    } else {
        if let Ok(user) = std::env::var("USER") {
            roots.push(Path::new("/media").join(&user));
            roots.push(Path::new("/run/media").join(&user));
        }
        roots.push(PathBuf::from("/media"));
        roots.push(PathBuf::from("/mnt"));
    }

    roots
}

/// Find the first `KoboReader.sqlite` under the platform's mount roots.
pub fn detect_device() -> Option<PathBuf> {
    let roots = default_mount_roots();
    if cfg!(windows) {
        // Each root is a volume.
        return roots
            .iter()
            .map(|root| root.join(KOBO_DB_RELATIVE_PATH))
            .find(|candidate| candidate.is_file());
    }
    detect_device_in(&roots)
}

/// Find the first `<root>/<volume>/.kobo/KoboReader.sqlite` under `roots`.
///
/// Volumes within a root are probed in name order so the result is stable.
pub fn detect_device_in(roots: &[PathBuf]) -> Option<PathBuf> {
    for root in roots {
        let Ok(entries) = std::fs::read_dir(root) else {
            continue;
        };
        let mut volumes: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_dir())
            .collect();
        volumes.sort();

        for volume in volumes {
            let candidate = volume.join(KOBO_DB_RELATIVE_PATH);
            debug!(candidate = %candidate.display(), "probing for Kobo database");
            if candidate.is_file() {
                info!(path = %candidate.display(), "found Kobo database");
                return Some(candidate);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn finds_database_on_mounted_volume() {
        let root = std::env::temp_dir().join(format!("marginalia_mounts_{}", Uuid::now_v7()));
        std::fs::create_dir_all(root.join("USB-STICK")).unwrap();
        std::fs::create_dir_all(root.join("KOBOeReader/.kobo")).unwrap();
        std::fs::write(root.join("KOBOeReader/.kobo/KoboReader.sqlite"), b"").unwrap();

        let found = detect_device_in(&[PathBuf::from("/nonexistent-root"), root.clone()]);
        assert_eq!(found, Some(root.join("KOBOeReader/.kobo/KoboReader.sqlite")));
    }

    #[test]
    fn no_device_is_none() {
        let root = std::env::temp_dir().join(format!("marginalia_nomounts_{}", Uuid::now_v7()));
        std::fs::create_dir_all(root.join("camera")).unwrap();
        assert_eq!(detect_device_in(&[root]), None);
    }
}
