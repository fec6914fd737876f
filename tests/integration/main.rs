//! Integration tests for Kiln

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    const DEFINITION: &str = r#"{
        "apiVersion": "kiln/v1",
        "targets": {
            "all": ["app"],
            "base": {"from": "golang:1.22", "workdir": "/src"},
            "app": {"from": "base", "command": "go build ./..."}
        }
    }"#;

    /// Command isolated from the user's config and environment
    fn kiln(dir: &Path) -> Command {
        let mut cmd = cargo_bin_cmd!("kiln");
        cmd.current_dir(dir)
            .env_remove("KILN_DEFINITION")
            .env_remove("KILN_DOCKER_CONFIG")
            .env_remove("KILN_FORCE_PULL")
            .env_remove("SSH_AUTH_SOCK")
            .env("KILN_CONFIG", dir.join("config.toml"));
        cmd
    }

    fn workspace(definition: &str) -> TempDir {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("kiln.json"), definition).unwrap();
        temp
    }

    #[test]
    fn help_displays() {
        let temp = TempDir::new().unwrap();
        kiln(temp.path())
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("container build pipelines"));
    }

    #[test]
    fn version_flag_displays() {
        let temp = TempDir::new().unwrap();
        kiln(temp.path())
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("kiln"));
    }

    #[test]
    fn version_command_prints_json() {
        let temp = TempDir::new().unwrap();
        kiln(temp.path())
            .arg("version")
            .assert()
            .success()
            .stdout(predicate::str::contains(r#""apiVersion":"kiln/v1""#));
    }

    #[test]
    fn config_path() {
        let temp = TempDir::new().unwrap();
        kiln(temp.path())
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show_defaults() {
        let temp = TempDir::new().unwrap();
        kiln(temp.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[builder]"))
            .stdout(predicate::str::contains("docker/dockerfile:1.4"));
    }

    #[test]
    fn config_set_then_show() {
        let temp = TempDir::new().unwrap();
        kiln(temp.path())
            .args(["config", "set", "builder.force_pull", "true"])
            .assert()
            .success();

        kiln(temp.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("force_pull = true"));
    }

    #[test]
    fn config_set_unknown_key() {
        let temp = TempDir::new().unwrap();
        kiln(temp.path())
            .args(["config", "set", "builder.colour", "red"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown config key"));
    }

    #[test]
    fn build_definition_prints_resolved_graph() {
        let temp = workspace(DEFINITION);
        kiln(temp.path())
            .args(["build", "definition"])
            .assert()
            .success()
            .stdout(predicate::str::contains(r#""name": "app""#))
            .stdout(predicate::str::contains(r#""from": "base""#));
    }

    #[test]
    fn build_definition_debug_prints_flat_json() {
        let temp = workspace(DEFINITION);
        kiln(temp.path())
            .args(["build", "definition-debug"])
            .assert()
            .success()
            .stdout(predicate::str::contains(r#""apiVersion": "kiln/v1""#));
    }

    #[test]
    fn build_definition_from_custom_path() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join("ci")).unwrap();
        std::fs::write(temp.path().join("ci").join("pipeline.json"), DEFINITION).unwrap();

        kiln(temp.path())
            .args(["build", "definition", "-d", "ci/pipeline.json"])
            .assert()
            .success()
            .stdout(predicate::str::contains(r#""name": "base""#));
    }

    #[test]
    fn missing_definition_fails() {
        let temp = TempDir::new().unwrap();
        kiln(temp.path())
            .args(["build", "definition"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("kiln.json"));
    }

    #[test]
    fn cycle_is_reported_with_trace() {
        let temp = workspace(
            r#"{"apiVersion": "kiln/v1", "targets": {
                "a": {"from": "b"},
                "b": {"from": "a"}
            }}"#,
        );
        kiln(temp.path())
            .args(["build", "definition"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Recursive graph detected"))
            .stderr(predicate::str::contains("a(from)->b(from)"));
    }

    #[test]
    fn unsupported_api_version() {
        let temp = workspace(r#"{"apiVersion": "kiln/v9", "targets": {"a": {"from": "alpine"}}}"#);
        kiln(temp.path())
            .args(["build", "definition"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("kiln/v9"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn unknown_target_fails_before_builder_runs() {
        let temp = workspace(DEFINITION);
        std::fs::write(
            temp.path().join("config.toml"),
            "[builder]\nexecutable = \"/nonexistent/docker\"\n",
        )
        .unwrap();

        kiln(temp.path())
            .args(["build", "nope"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Target not found: nope"));
    }

    #[test]
    fn completions_generate() {
        let temp = TempDir::new().unwrap();
        kiln(temp.path())
            .args(["completions", "bash"])
            .assert()
            .success()
            .stdout(predicate::str::contains("kiln"));
    }

    /// Shell script standing in for the docker CLI: records every invocation
    /// and keeps the last Dockerfile it was fed.
    #[cfg(unix)]
    fn fake_docker(dir: &Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("docker");
        let script = format!(
            "#!/bin/sh\n\
             echo \"$*\" >> {log}\n\
             if [ \"$1 $2\" = \"builder build\" ]; then cat > {dockerfile}; fi\n\
             exit 0\n",
            log = dir.join("calls.log").display(),
            dockerfile = dir.join("Dockerfile.last").display(),
        );
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[test]
    fn build_drives_builder() {
        let temp = workspace(DEFINITION);
        let docker = fake_docker(temp.path());
        std::fs::write(
            temp.path().join("config.toml"),
            format!("[builder]\nexecutable = \"{}\"\n", docker.display()),
        )
        .unwrap();

        kiln(temp.path()).arg("build").assert().success();

        let calls = std::fs::read_to_string(temp.path().join("calls.log")).unwrap();
        let lines: Vec<&str> = calls.lines().collect();
        assert!(lines[0].starts_with("image ls"));
        assert!(lines.contains(&"pull docker/dockerfile:1.4"));
        assert!(lines.contains(&"pull golang:1.22"));
        assert_eq!(
            lines.last().copied(),
            Some("builder build --target app -f- .")
        );

        let dockerfile = std::fs::read_to_string(temp.path().join("Dockerfile.last")).unwrap();
        assert!(dockerfile.starts_with("# syntax=docker/dockerfile:1.4\n"));
        assert!(dockerfile.contains("FROM golang:1.22 AS base"));
        assert!(dockerfile.contains("FROM base AS app"));
    }

    #[cfg(unix)]
    #[test]
    fn docker_config_flag_is_forwarded() {
        let temp = TempDir::new().unwrap();
        let docker = fake_docker(temp.path());
        std::fs::write(
            temp.path().join("config.toml"),
            format!("[builder]\nexecutable = \"{}\"\n", docker.display()),
        )
        .unwrap();

        kiln(temp.path())
            .args(["--docker-config", "/etc/docker-ci", "cache", "clear", "--all"])
            .assert()
            .success();

        let calls = std::fs::read_to_string(temp.path().join("calls.log")).unwrap();
        assert_eq!(
            calls.trim_end(),
            "--config /etc/docker-ci builder prune -f -a"
        );
    }
}
