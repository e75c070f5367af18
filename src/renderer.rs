use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info};

use crate::errors::{MapError, Result};
use crate::tile::Tile;

/// Completion report for one render request.
#[derive(Debug)]
pub struct RenderOutcome {
    pub tile: Tile,
    pub result: Result<PathBuf>,
}

/// Runs the external tile renderer, one process per tile, on a background
/// thread.
///
/// Requests are queued and served in order. Outcomes come back on the
/// receiver returned by [`TileRenderer::spawn`] and carry no promise that the
/// tile is still on screen. A failed render is reported once and never
/// retried.
pub struct TileRenderer {
    requests: Option<Sender<Tile>>,
    worker: Option<JoinHandle<()>>,
    program: PathBuf,
}

impl TileRenderer {
    pub fn spawn(program: PathBuf, cache_root: PathBuf) -> (Self, Receiver<RenderOutcome>) {
        let (request_tx, request_rx) = mpsc::channel::<Tile>();
        let (outcome_tx, outcome_rx) = mpsc::channel();

        let worker_program = program.clone();
        let worker = thread::spawn(move || {
            for tile in request_rx {
                let result = render_tile(&worker_program, &cache_root, &tile);
                if let Err(e) = &result {
                    error!("Rendering tile {} failed: {}", tile, e);
                }
                if outcome_tx.send(RenderOutcome { tile, result }).is_err() {
                    break;
                }
            }
            debug!("Renderer worker stopped");
        });

        info!("Started tile renderer {}", program.display());
        (
            Self {
                requests: Some(request_tx),
                worker: Some(worker),
                program,
            },
            outcome_rx,
        )
    }

    pub fn request(&self, tile: Tile) -> Result<()> {
        let sent = self
            .requests
            .as_ref()
            .map(|requests| requests.send(tile).is_ok())
            .unwrap_or(false);
        if sent {
            Ok(())
        } else {
            Err(MapError::external(
                self.program.display().to_string(),
                "renderer worker is no longer running",
            ))
        }
    }
}

impl Drop for TileRenderer {
    fn drop(&mut self) {
        // Closing the queue lets the worker finish its current tile and exit.
        self.requests.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn render_tile(program: &Path, cache_root: &Path, tile: &Tile) -> Result<PathBuf> {
    let name = program.display().to_string();
    let mut child = Command::new(program)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| MapError::external(&name, e.to_string()))?;

    send_request(&mut child, &tile.render_request_line())
        .map_err(|e| MapError::external(&name, e.to_string()))?;

    let output = child
        .wait_with_output()
        .map_err(|e| MapError::external(&name, e.to_string()))?;
    for line in String::from_utf8_lossy(&output.stdout).lines() {
        debug!("renderer: {}", line);
    }
    if !output.status.success() {
        return Err(MapError::external(
            name,
            format!(
                "{} ({})",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        ));
    }

    let path = tile.cache_path(cache_root);
    if !path.is_file() {
        return Err(MapError::external(
            name,
            format!("no image at {}", path.display()),
        ));
    }
    Ok(path)
}

/// Writes the request line and closes the child's stdin. If the write fails
/// the child is killed and reaped before the error is returned.
fn send_request(child: &mut Child, line: &str) -> io::Result<()> {
    let Some(mut stdin) = child.stdin.take() else {
        return Ok(());
    };
    if let Err(e) = stdin.write_all(line.as_bytes()) {
        drop(stdin);
        let _ = child.kill();
        let _ = child.wait();
        return Err(e);
    }
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader};

    #[test]
    fn failed_request_reaps_the_child() {
        // The child closes its stdin, says so, then idles.
        let mut child = Command::new("sh")
            .args(["-c", "exec 0<&-; echo closed; exec sleep 30"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .unwrap();
        let mut stdout = BufReader::new(child.stdout.take().unwrap());
        let mut line = String::new();
        stdout.read_line(&mut line).unwrap();
        assert_eq!(line.trim(), "closed");

        let result = send_request(&mut child, "3 4 5\n");
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::BrokenPipe);
        assert!(child.stdin.is_none());
        assert!(child.try_wait().unwrap().is_some());
    }

    #[test]
    fn request_reaches_the_child() {
        let mut child = Command::new("sh")
            .args(["-c", "read line; echo \"got $line\""])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .unwrap();
        send_request(&mut child, "3 4 5\n").unwrap();
        assert!(child.stdin.is_none());

        let output = child.wait_with_output().unwrap();
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "got 3 4 5");
    }
}
