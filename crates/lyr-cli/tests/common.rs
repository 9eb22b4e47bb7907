#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use zip::{write::FileOptions, ZipWriter};

pub const LAYER_NAME: &str = "faas-supervisor";

pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in entries {
        writer
            .start_file(*name, FileOptions::default())
            .expect("start entry");
        writer.write_all(body).expect("write entry");
    }
    writer.finish().expect("finish zip").into_inner()
}

/// A release tarball as the repository host serves it.
pub fn release_zip(tag: &str) -> Vec<u8> {
    let deps = zip_bytes(&[("bin/tool", b"#!/bin/sh\n".as_slice())]);
    let top = format!("faas-supervisor-{tag}");
    let init = format!("{top}/faassupervisor/__init__.py");
    let extra = format!("{top}/extra/deps.zip");
    let readme = format!("{top}/README.md");
    zip_bytes(&[
        (init.as_str(), b"VERSION = 1\n".as_slice()),
        (extra.as_str(), deps.as_slice()),
        (readme.as_str(), b"docs\n".as_slice()),
    ])
}

/// `lyr` isolated from the caller's configuration and environment.
pub fn lyr(workdir: &Path) -> Command {
    let mut cmd = cargo_bin_cmd!("lyr");
    cmd.current_dir(workdir)
        .env("XDG_CONFIG_HOME", workdir.join("xdg"))
        .env("HOME", workdir)
        .env("NO_COLOR", "1");
    for (key, _) in std::env::vars() {
        if key.starts_with("LYR_") {
            cmd.env_remove(key);
        }
    }
    cmd
}

/// `lyr` wired to a local registry and the given archive host.
pub fn configured_lyr(workdir: &Path, archive_base: &str, version: &str) -> Command {
    let mut cmd = lyr(workdir);
    cmd.env("LYR_LAYER_NAME", LAYER_NAME)
        .env("LYR_SUPERVISOR_VERSION", version)
        .env("LYR_LICENSE_INFO", "Apache 2.0")
        .env("LYR_ARCHIVE_BASE", archive_base)
        .env("LYR_REGISTRY_PATH", workdir.join("registry"))
        .env("LYR_TMP_ROOT", workdir.join("tmp"));
    cmd
}

pub fn parse_json(output: &[u8]) -> serde_json::Value {
    serde_json::from_slice(output).expect("json envelope")
}
