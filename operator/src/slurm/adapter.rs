//! Batch-scheduler adapter: lists nodes and jobs over a Unix-domain HTTP
//! socket or a local subprocess, and cancels jobs over the socket.

use crate::util::Error;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::process::Command;

use super::types::{SlurmJob, SlurmNode, SlurmResponse};

const SLURMRESTD_VERSION: &str = "v0.0.40";
const SOCKET_TIMEOUT: Duration = Duration::from_secs(5);
const CANCEL_TIMEOUT: Duration = Duration::from_secs(10);

pub struct SchedulerAdapter {
    socket_path: Option<String>,
}

impl SchedulerAdapter {
    pub fn new(socket_path: Option<String>) -> Self {
        SchedulerAdapter { socket_path }
    }

    pub async fn list_nodes(&self) -> Result<Vec<SlurmNode>, Error> {
        match &self.socket_path {
            Some(path) => Ok(self.get_over_socket(path, &format!("/slurm/{SLURMRESTD_VERSION}/nodes")).await?.nodes),
            None => Ok(list_nodes_from_command().await?),
        }
    }

    pub async fn list_jobs(&self) -> Result<Vec<SlurmJob>, Error> {
        match &self.socket_path {
            Some(path) => Ok(self.get_over_socket(path, &format!("/slurm/{SLURMRESTD_VERSION}/jobs")).await?.jobs),
            None => Ok(list_jobs_from_command().await?),
        }
    }

    pub async fn cancel_job(&self, job_id: i64) -> Result<(), Error> {
        let path = self
            .socket_path
            .as_deref()
            .ok_or_else(|| Error::SchedulerRequest("cancel requires a socket-backed scheduler".into()))?;
        let status = tokio::time::timeout(CANCEL_TIMEOUT, delete(path, &format!("/slurm/{SLURMRESTD_VERSION}/job/{job_id}")))
            .await
            .map_err(|_| Error::SchedulerTimeout)??;
        if !(200..300).contains(&status) {
            return Err(Error::SchedulerRequest(format!("cancel job {job_id}: status {status}")));
        }
        Ok(())
    }

    async fn get_over_socket(&self, socket_path: &str, path: &str) -> Result<SlurmResponse, Error> {
        let body = tokio::time::timeout(SOCKET_TIMEOUT, get(socket_path, path))
            .await
            .map_err(|_| Error::SchedulerTimeout)??;
        serde_json::from_str(&body).map_err(Error::Json)
    }
}

async fn list_nodes_from_command() -> Result<Vec<SlurmNode>, Error> {
    let output = Command::new("scontrol")
        .args(["show", "node", "--json"])
        .output()
        .await?;
    if !output.status.success() {
        return Err(Error::SchedulerRequest(format!(
            "scontrol show node exited with {}",
            output.status
        )));
    }
    let response: SlurmResponse = serde_json::from_slice(&output.stdout)?;
    Ok(response.nodes)
}

async fn list_jobs_from_command() -> Result<Vec<SlurmJob>, Error> {
    let output = Command::new("squeue").args(["-a", "--json"]).output().await?;
    if !output.status.success() {
        return Err(Error::SchedulerRequest(format!(
            "squeue -a exited with {}",
            output.status
        )));
    }
    let response: SlurmResponse = serde_json::from_slice(&output.stdout)?;
    Ok(response.jobs)
}

async fn get(socket_path: &str, path: &str) -> Result<String, Error> {
    let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
    send_request(socket_path, &request).await.map(|(_, body)| body)
}

async fn delete(socket_path: &str, path: &str) -> Result<u16, Error> {
    let request = format!("DELETE {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
    send_request(socket_path, &request).await.map(|(status, _)| status)
}

async fn send_request(socket_path: &str, request: &str) -> Result<(u16, String), Error> {
    let mut stream = UnixStream::connect(Path::new(socket_path))
        .await
        .map_err(|e| Error::SchedulerRequest(format!("connect {socket_path}: {e}")))?;
    stream
        .write_all(request.as_bytes())
        .await
        .map_err(|e| Error::SchedulerRequest(format!("write request: {e}")))?;

    let mut reader = BufReader::new(&mut stream);
    read_http_response(&mut reader).await
}

async fn read_http_response<R: tokio::io::AsyncRead + Unpin>(
    reader: &mut BufReader<R>,
) -> Result<(u16, String), Error> {
    let mut status_line = String::new();
    reader
        .read_line(&mut status_line)
        .await
        .map_err(|e| Error::SchedulerRequest(format!("read status line: {e}")))?;
    let status: u16 = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);

    let mut content_length: usize = 0;
    loop {
        let mut line = String::new();
        reader
            .read_line(&mut line)
            .await
            .map_err(|e| Error::SchedulerRequest(format!("read header: {e}")))?;
        if line == "\r\n" || line.is_empty() {
            break;
        }
        if let Some(value) = line.to_ascii_lowercase().strip_prefix("content-length:") {
            content_length = value.trim().parse().unwrap_or(0);
        }
    }

    let mut body = vec![0u8; content_length];
    if content_length > 0 {
        reader
            .read_exact(&mut body)
            .await
            .map_err(|e| Error::SchedulerRequest(format!("read body: {e}")))?;
    }
    Ok((status, String::from_utf8_lossy(&body).into_owned()))
}
