//! Docker engine adapter.
//!
//! Drives the `docker` command-line tool. Listings use `--format '{{json .}}'`
//! so every output line is one JSON object.

use std::process::Stdio;

use async_trait::async_trait;
use pyrsia_reconcile::{
    ContainerFilter, ContainerInfo, DockerProbe, LocalImage, ProbeError, ProgressStream, PullEvent,
};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

const SERVICE: &str = "docker";
const UNTAGGED: &str = "<none>";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ImageRow {
    #[serde(rename = "ID")]
    id: String,
    repository: String,
    tag: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerRow {
    #[serde(rename = "ID")]
    id: String,
    image: String,
}

/// Docker probe backed by the docker CLI.
#[derive(Debug, Clone)]
pub struct DockerCli {
    bin: String,
}

impl DockerCli {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut command = Command::new(&self.bin);
        command
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        command
    }

    /// Run to completion and return stdout.
    async fn run(&self, args: &[&str]) -> Result<String, ProbeError> {
        debug!(bin = %self.bin, ?args, "Running docker");
        let output = self
            .command(args)
            .output()
            .await
            .map_err(|e| spawn_error(&self.bin, e))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            Err(command_error(stderr))
        }
    }
}

fn spawn_error(bin: &str, e: std::io::Error) -> ProbeError {
    if e.kind() == std::io::ErrorKind::NotFound {
        ProbeError::Unavailable {
            service: SERVICE,
            message: format!("'{bin}' not found"),
        }
    } else {
        ProbeError::Io(e)
    }
}

fn command_error(stderr: String) -> ProbeError {
    if stderr.contains("Cannot connect to the Docker daemon")
        || stderr.contains("error during connect")
    {
        ProbeError::Unavailable {
            service: SERVICE,
            message: stderr,
        }
    } else {
        ProbeError::Request(stderr)
    }
}

/// Parse `docker image ls --format '{{json .}}'` output.
pub fn parse_images(output: &str) -> Result<Vec<LocalImage>, ProbeError> {
    json_lines::<ImageRow>(output)?
        .into_iter()
        .map(|row| {
            let raw_label = format!("{}:{}", row.repository, row.tag);
            let identity = if row.repository == UNTAGGED || row.tag == UNTAGGED {
                format!("{UNTAGGED}:{UNTAGGED}")
            } else {
                raw_label.clone()
            };
            Ok(LocalImage {
                id: row.id,
                identity,
                raw_label,
            })
        })
        .collect()
}

/// Parse `docker container ls --format '{{json .}}'` output.
pub fn parse_containers(output: &str) -> Result<Vec<ContainerInfo>, ProbeError> {
    Ok(json_lines::<ContainerRow>(output)?
        .into_iter()
        .map(|row| ContainerInfo {
            id: row.id,
            image_identity: row.image,
        })
        .collect())
}

fn json_lines<T: serde::de::DeserializeOwned>(output: &str) -> Result<Vec<T>, ProbeError> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            serde_json::from_str(line)
                .map_err(|e| ProbeError::Protocol(format!("{e}: {line}")))
        })
        .collect()
}

#[async_trait]
impl DockerProbe for DockerCli {
    async fn ping(&self) -> Result<(), ProbeError> {
        let version = self.run(&["version", "--format", "{{.Server.Version}}"]).await?;
        debug!(version = %version.trim(), "Docker reachable");
        Ok(())
    }

    async fn list_local_images(&self) -> Result<Vec<LocalImage>, ProbeError> {
        let output = self.run(&["image", "ls", "--format", "{{json .}}"]).await?;
        parse_images(&output)
    }

    async fn list_containers(
        &self,
        filter: ContainerFilter,
    ) -> Result<Vec<ContainerInfo>, ProbeError> {
        let mut args = vec!["container", "ls", "--format", "{{json .}}"];
        if filter.all {
            args.push("--all");
        }
        let output = self.run(&args).await?;
        parse_containers(&output)
    }

    async fn remove_image(&self, image: &LocalImage) -> Result<(), ProbeError> {
        let reference = image.display_identity().unwrap_or(&image.id);
        info!(image = %reference, "Removing image");
        self.run(&["image", "rm", "--force", reference]).await?;
        Ok(())
    }

    async fn pull_image(&self, identity: &str) -> Result<ProgressStream, ProbeError> {
        info!(image = %identity, "Pulling image");
        let mut child = self
            .command(&["pull", identity])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| spawn_error(&self.bin, e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ProbeError::Protocol("pull stdout not captured".to_string()))?;
        let stderr = child.stderr.take();

        let (tx, rx) = mpsc::channel(64);
        let identity = identity.to_string();
        tokio::spawn(async move {
            // Both pipes are drained together so a chatty stderr cannot stall the child.
            let progress = async {
                let mut lines = BufReader::new(stdout).lines();
                loop {
                    match lines.next_line().await {
                        Ok(Some(line)) => {
                            if tx.send(PullEvent::Progress(line)).await.is_err() {
                                debug!(image = %identity, "Pull progress receiver dropped");
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            warn!(image = %identity, error = %e, "Failed to read pull output");
                            break;
                        }
                    }
                }
            };
            let errors = async {
                let mut error_output = String::new();
                if let Some(stderr) = stderr {
                    let mut lines = BufReader::new(stderr).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        if !error_output.is_empty() {
                            error_output.push('\n');
                        }
                        error_output.push_str(&line);
                    }
                }
                error_output
            };
            let ((), error_output) = tokio::join!(progress, errors);

            let result = match child.wait().await {
                Ok(status) if status.success() => Ok(()),
                Ok(status) if error_output.is_empty() => Err(format!("docker pull exited with {status}")),
                Ok(_) => Err(error_output),
                Err(e) => Err(e.to_string()),
            };
            let _ = tx.send(PullEvent::Finished(result)).await;
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_parse_images() {
        let output = r#"
{"Containers":"N/A","CreatedAt":"2024-01-10 10:00:00 +0000 UTC","ID":"f8c20f8bbcb6","Repository":"alpine","Tag":"3.19","Size":"7.38MB"}
{"Containers":"N/A","ID":"0a1b2c3d4e5f","Repository":"<none>","Tag":"<none>","Size":"1MB"}
{"ID":"9e8d7c6b5a4f","Repository":"localhost:5000/app","Tag":"<none>"}
"#;
        let images = parse_images(output).unwrap();
        assert_eq!(images.len(), 3);
        assert_eq!(images[0].display_identity(), Some("alpine:3.19"));
        assert_eq!(images[0].id, "f8c20f8bbcb6");
        assert_eq!(images[1].display_identity(), None);
        assert_eq!(images[2].display_identity(), None);
        assert_eq!(images[2].raw_label, "localhost:5000/app:<none>");
    }

    #[test]
    fn test_parse_containers() {
        let output = r#"{"ID":"c1","Image":"redis:7","Names":"cache","State":"running"}"#;
        let containers = parse_containers(output).unwrap();
        assert_eq!(
            containers,
            vec![ContainerInfo {
                id: "c1".to_string(),
                image_identity: "redis:7".to_string()
            }]
        );
    }

    #[test]
    fn test_parse_garbage() {
        assert!(matches!(parse_images("not json"), Err(ProbeError::Protocol(_))));
        assert!(parse_images("").unwrap().is_empty());
    }

    #[rstest]
    #[case(
        "Cannot connect to the Docker daemon at unix:///var/run/docker.sock",
        true
    )]
    #[case("Error response from daemon: No such image: x:1", false)]
    fn test_command_error(#[case] stderr: &str, #[case] unavailable: bool) {
        let err = command_error(stderr.to_string());
        assert_eq!(matches!(err, ProbeError::Unavailable { .. }), unavailable);
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let docker = DockerCli::new("/nonexistent/docker-binary");
        assert!(matches!(
            docker.ping().await,
            Err(ProbeError::Unavailable { .. })
        ));
    }

    #[cfg(unix)]
    fn fake_docker(dir: &tempfile::TempDir, script: &str) -> DockerCli {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("docker");
        std::fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        DockerCli::new(path.to_string_lossy())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_pull_streams_progress() {
        let dir = tempfile::tempdir().unwrap();
        let docker = fake_docker(
            &dir,
            "echo \"3.19: Pulling from library/alpine\"\necho \"Digest: sha256:abc\"",
        );

        let events: Vec<PullEvent> = docker.pull_image("alpine:3.19").await.unwrap().collect().await;
        assert_eq!(
            events,
            vec![
                PullEvent::Progress("3.19: Pulling from library/alpine".to_string()),
                PullEvent::Progress("Digest: sha256:abc".to_string()),
                PullEvent::Finished(Ok(())),
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_pull_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let docker = fake_docker(&dir, "echo \"manifest unknown\" >&2\nexit 1");

        let events: Vec<PullEvent> = docker.pull_image("nope:1").await.unwrap().collect().await;
        assert_eq!(
            events,
            vec![PullEvent::Finished(Err("manifest unknown".to_string()))]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_pull_with_large_stderr_completes() {
        let dir = tempfile::tempdir().unwrap();
        // Far more than a pipe buffer of stderr before stdout closes.
        let docker = fake_docker(
            &dir,
            "i=0\nwhile [ $i -lt 4000 ]; do echo \"warning: layer $i retried after a registry timeout\" >&2; i=$((i+1)); done\necho \"Status: done\"\nexit 1",
        );

        let events: Vec<PullEvent> = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            docker.pull_image("alpine:3.19").await.unwrap().collect::<Vec<_>>(),
        )
        .await
        .expect("pull did not finish");

        assert_eq!(events[0], PullEvent::Progress("Status: done".to_string()));
        match &events[1] {
            PullEvent::Finished(Err(stderr)) => assert_eq!(stderr.lines().count(), 4000),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_list_images_through_binary() {
        let dir = tempfile::tempdir().unwrap();
        let docker = fake_docker(
            &dir,
            r#"echo '{"ID":"f8c20f8bbcb6","Repository":"alpine","Tag":"3.19"}'"#,
        );

        let images = docker.list_local_images().await.unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].identity, "alpine:3.19");
    }
}
