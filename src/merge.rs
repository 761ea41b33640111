//! Upsert-by-key helpers for ordered Kubernetes lists.
//!
//! Every ensure-operation in the webhook and the desired-state builder goes
//! through these so that re-applying a mutation replaces entries in place
//! instead of appending duplicates.

use k8s_openapi::api::core::v1::{Volume, VolumeMount};

/// Replace the entry matching `key`, preserving its position, or append.
fn upsert_by<T, F>(mut items: Vec<T>, item: T, key: F) -> Vec<T>
where
    F: Fn(&T) -> bool,
{
    match items.iter().position(|existing| key(existing)) {
        Some(idx) => items[idx] = item,
        None => items.push(item),
    }
    items
}

/// Ensure a command-line flag `<prefix><value>` is present, keyed by prefix.
pub fn ensure_string_with_prefix(items: Vec<String>, prefix: &str, value: &str) -> Vec<String> {
    upsert_by(items, format!("{prefix}{value}"), |existing| {
        existing.starts_with(prefix)
    })
}

/// Ensure a volume mount is present, keyed by mount name.
pub fn ensure_volume_mount_with_name(mounts: Vec<VolumeMount>, mount: VolumeMount) -> Vec<VolumeMount> {
    let name = mount.name.clone();
    upsert_by(mounts, mount, |existing| existing.name == name)
}

/// Ensure a volume is present, keyed by volume name.
pub fn ensure_volume_with_name(volumes: Vec<Volume>, volume: Volume) -> Vec<Volume> {
    let name = volume.name.clone();
    upsert_by(volumes, volume, |existing| existing.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMapVolumeSource;

    fn mount(name: &str, path: &str) -> VolumeMount {
        VolumeMount {
            name: name.to_string(),
            mount_path: path.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_ensure_string_with_prefix_appends_new_flag() {
        let args = vec!["--v=2".to_string()];
        let args = ensure_string_with_prefix(args, "--audit-log-path=", "/var/log/audit.log");
        assert_eq!(
            args,
            vec![
                "--v=2".to_string(),
                "--audit-log-path=/var/log/audit.log".to_string()
            ]
        );
    }

    #[test]
    fn test_ensure_string_with_prefix_replaces_in_place() {
        let args = vec![
            "--v=2".to_string(),
            "--audit-log-path=/old".to_string(),
            "--profiling=false".to_string(),
        ];
        let args = ensure_string_with_prefix(args, "--audit-log-path=", "/new");
        assert_eq!(
            args,
            vec![
                "--v=2".to_string(),
                "--audit-log-path=/new".to_string(),
                "--profiling=false".to_string(),
            ]
        );
    }

    #[test]
    fn test_ensure_string_with_prefix_is_idempotent() {
        let args = vec!["--v=2".to_string()];
        let once = ensure_string_with_prefix(args, "--feature=", "on");
        let twice = ensure_string_with_prefix(once.clone(), "--feature=", "on");
        assert_eq!(once, twice);
    }

    #[test]
    fn test_ensure_volume_mount_with_name() {
        let mounts = vec![mount("certs", "/etc/certs"), mount("config", "/old")];
        let mounts = ensure_volume_mount_with_name(mounts, mount("config", "/etc/config"));
        assert_eq!(mounts.len(), 2);
        assert_eq!(mounts[1].name, "config");
        assert_eq!(mounts[1].mount_path, "/etc/config");

        let mounts = ensure_volume_mount_with_name(mounts, mount("extra", "/extra"));
        assert_eq!(mounts.len(), 3);
        assert_eq!(mounts[2].name, "extra");
    }

    #[test]
    fn test_ensure_volume_with_name() {
        fn mk(name: &str, cm: &str) -> Volume {
            Volume {
                name: name.to_string(),
                config_map: Some(ConfigMapVolumeSource {
                    name: cm.to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            }
        }

        let volumes = vec![mk("config", "old-cm")];
        let volumes = ensure_volume_with_name(volumes, mk("config", "new-cm"));
        assert_eq!(volumes.len(), 1);
        assert_eq!(
            volumes[0].config_map.as_ref().map(|c| c.name.as_str()),
            Some("new-cm")
        );
    }

    #[test]
    fn test_untouched_entries_keep_relative_order() {
        let args: Vec<String> = ["a=1", "b=2", "c=3", "d=4"]
            .iter()
            .map(|s| format!("--{s}"))
            .collect();
        let merged = ensure_string_with_prefix(args, "--b=", "9");
        assert_eq!(merged, vec!["--a=1", "--b=9", "--c=3", "--d=4"]);
    }
}
