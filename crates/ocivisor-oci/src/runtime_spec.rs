//! OCI Runtime Specification types, consumed by the in-guest container init
//! and handed to the external OCI runtime (e.g. `crun`) as `config.json`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeSpec {
    #[serde(rename = "ociVersion")]
    pub oci_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<Root>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process: Option<Process>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domainname: Option<String>,
    #[serde(default)]
    pub mounts: Vec<Mount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hooks: Option<Hooks>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linux: Option<Linux>,
}

impl RuntimeSpec {
    /// A spec with sensible defaults for running `command` under a freshly
    /// extracted rootfs, mirroring the teacher's container-launch defaults.
    pub fn new(command: Vec<String>, env: Vec<(String, String)>, cwd: &str, terminal: bool) -> Self {
        let mut env_strings = vec![
            "PATH=/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin".to_string(),
            "HOME=/root".to_string(),
            "TERM=xterm-256color".to_string(),
        ];
        env_strings.extend(env.into_iter().map(|(k, v)| format!("{k}={v}")));

        RuntimeSpec {
            oci_version: "1.0.2".to_string(),
            root: Some(Root {
                path: "rootfs".to_string(),
                readonly: false,
            }),
            process: Some(Process {
                terminal,
                user: User {
                    uid: 0,
                    gid: 0,
                    additional_gids: Vec::new(),
                },
                args: command,
                env: env_strings,
                cwd: cwd.to_string(),
                capabilities: Some(Capabilities::default_root()),
                rlimits: Vec::new(),
                no_new_privileges: false,
            }),
            hostname: None,
            domainname: None,
            mounts: default_mounts(),
            annotations: None,
            hooks: None,
            linux: Some(Linux {
                namespaces: default_namespaces(),
                devices: Vec::new(),
                masked_paths: Vec::new(),
                readonly_paths: Vec::new(),
                uid_mappings: Vec::new(),
                gid_mappings: Vec::new(),
                seccomp: None,
                resources: None,
            }),
        }
    }

    /// Append a bind mount entry, matching the teacher's
    /// `add_bind_mount` convenience.
    pub fn add_bind_mount(&mut self, source: &str, destination: &str, readonly: bool) {
        let mut options = vec!["bind".to_string(), "nosuid".to_string(), "noexec".to_string()];
        if readonly {
            options.push("ro".to_string());
        }
        self.mounts.push(Mount {
            destination: destination.to_string(),
            mount_type: Some("bind".to_string()),
            source: source.to_string(),
            options,
        });
    }
}

fn default_mounts() -> Vec<Mount> {
    vec![
        Mount {
            destination: "/proc".to_string(),
            mount_type: Some("proc".to_string()),
            source: "proc".to_string(),
            options: Vec::new(),
        },
        Mount {
            destination: "/dev".to_string(),
            mount_type: Some("tmpfs".to_string()),
            source: "tmpfs".to_string(),
            options: vec!["nosuid".to_string(), "strictatime".to_string(), "mode=755".to_string()],
        },
        Mount {
            destination: "/sys".to_string(),
            mount_type: Some("sysfs".to_string()),
            source: "sysfs".to_string(),
            options: vec!["nosuid".to_string(), "noexec".to_string(), "nodev".to_string(), "ro".to_string()],
        },
    ]
}

fn default_namespaces() -> Vec<Namespace> {
    ["pid", "network", "mount", "ipc", "uts"]
        .into_iter()
        .map(|t| Namespace { ns_type: t.to_string(), path: None })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Root {
    pub path: String,
    #[serde(default)]
    pub readonly: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Process {
    #[serde(default)]
    pub terminal: bool,
    pub user: User,
    pub args: Vec<String>,
    #[serde(default)]
    pub env: Vec<String>,
    pub cwd: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Capabilities>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rlimits: Vec<Rlimit>,
    #[serde(rename = "noNewPrivileges", default)]
    pub no_new_privileges: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub uid: u32,
    pub gid: u32,
    #[serde(rename = "additionalGids", default, skip_serializing_if = "Vec::is_empty")]
    pub additional_gids: Vec<u32>,
}

/// The five named Linux capability sets, expressed by name rather than bit
/// index in the runtime spec wire format; `ocivisor_rootfs::Capabilities`
/// does the name-to-bit translation when applying them.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Capabilities {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bounding: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub effective: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inheritable: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permitted: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ambient: Vec<String>,
}

impl Capabilities {
    /// A minimal set suitable for a root-run container, matching the
    /// teacher's `default_capabilities()` list.
    pub fn default_root() -> Self {
        let names = default_capability_names();
        Capabilities {
            bounding: names.clone(),
            effective: names.clone(),
            inheritable: Vec::new(),
            permitted: names,
            ambient: Vec::new(),
        }
    }
}

fn default_capability_names() -> Vec<String> {
    [
        "CAP_CHOWN",
        "CAP_DAC_OVERRIDE",
        "CAP_FSETID",
        "CAP_FOWNER",
        "CAP_MKNOD",
        "CAP_NET_RAW",
        "CAP_SETGID",
        "CAP_SETUID",
        "CAP_SETFCAP",
        "CAP_SETPCAP",
        "CAP_NET_BIND_SERVICE",
        "CAP_SYS_CHROOT",
        "CAP_KILL",
        "CAP_AUDIT_WRITE",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rlimit {
    #[serde(rename = "type")]
    pub rlimit_type: String,
    pub hard: u64,
    pub soft: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Linux {
    pub namespaces: Vec<Namespace>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub devices: Vec<Device>,
    #[serde(rename = "maskedPaths", default, skip_serializing_if = "Vec::is_empty")]
    pub masked_paths: Vec<String>,
    #[serde(rename = "readonlyPaths", default, skip_serializing_if = "Vec::is_empty")]
    pub readonly_paths: Vec<String>,
    #[serde(rename = "uidMappings", default, skip_serializing_if = "Vec::is_empty")]
    pub uid_mappings: Vec<IdMapping>,
    #[serde(rename = "gidMappings", default, skip_serializing_if = "Vec::is_empty")]
    pub gid_mappings: Vec<IdMapping>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seccomp: Option<Seccomp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Resources>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdMapping {
    #[serde(rename = "containerID")]
    pub container_id: u32,
    #[serde(rename = "hostID")]
    pub host_id: u32,
    pub size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Seccomp {
    #[serde(rename = "defaultAction")]
    pub default_action: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub architectures: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Resources {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemoryResources>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<CpuResources>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryResources {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpuResources {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shares: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    #[serde(rename = "type")]
    pub device_type: String,
    pub path: String,
    pub major: u32,
    pub minor: u32,
    #[serde(rename = "fileMode", skip_serializing_if = "Option::is_none")]
    pub file_mode: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gid: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Namespace {
    #[serde(rename = "type")]
    pub ns_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mount {
    pub destination: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub mount_type: Option<String>,
    pub source: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hooks {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prestart: Vec<Hook>,
    #[serde(rename = "createRuntime", default, skip_serializing_if = "Vec::is_empty")]
    pub create_runtime: Vec<Hook>,
    #[serde(rename = "startContainer", default, skip_serializing_if = "Vec::is_empty")]
    pub start_container: Vec<Hook>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub poststart: Vec<Hook>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub poststop: Vec<Hook>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hook {
    pub path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_spec_has_proc_dev_sys_mounts_and_root_capabilities() {
        let spec = RuntimeSpec::new(vec!["/bin/sh".to_string()], vec![], "/", false);
        assert_eq!(spec.mounts.len(), 3);
        let process = spec.process.unwrap();
        assert_eq!(process.user.uid, 0);
        assert!(!process.capabilities.unwrap().bounding.is_empty());
    }

    #[test]
    fn add_bind_mount_appends_ro_option_when_requested() {
        let mut spec = RuntimeSpec::new(vec!["/bin/sh".to_string()], vec![], "/", false);
        let before = spec.mounts.len();
        spec.add_bind_mount("/host/data", "/data", true);
        assert_eq!(spec.mounts.len(), before + 1);
        let added = spec.mounts.last().unwrap();
        assert!(added.options.contains(&"ro".to_string()));
    }

    #[test]
    fn runtime_spec_round_trips_through_json() {
        let spec = RuntimeSpec::new(vec!["/bin/sh".to_string()], vec![("FOO".to_string(), "bar".to_string())], "/", true);
        let json = serde_json::to_string(&spec).unwrap();
        let back: RuntimeSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back.oci_version, spec.oci_version);
        assert_eq!(back.process.unwrap().args, vec!["/bin/sh".to_string()]);
    }
}
