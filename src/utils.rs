use colored::ColoredString;
use log::{debug, error, trace, warn};
use std::env;
use std::process::Command;
use std::str;
use tokio::io::AsyncRead;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::{
    io::{self, AsyncBufReadExt},
    process::Command as TokioCommand,
};

pub fn which(tool: &str) -> Option<String> {
    debug!("Searching for tool: {}", tool);
    let which_output = match Command::new("which")
        .args([tool])
        .output()
        .map_err(|e| e.to_string())
    {
        Ok(output) => output,
        Err(e) => {
            warn!("Failed to execute 'which' command: {}", e);
            return None;
        }
    };

    let which = match std::str::from_utf8(&which_output.stdout).map_err(|e| e.to_string()) {
        Ok(s) => s.trim().to_string(),
        Err(e) => {
            warn!("Failed to parse 'which' output: {}", e);
            return None;
        }
    };

    if !which_output.status.success() || which.is_empty() {
        debug!("Tool '{}' not found", tool);
        None
    } else {
        trace!("Found tool '{}' at path: {}", tool, which);
        Some(which)
    }
}

pub fn first_which(candidates: Vec<&str>) -> Option<String> {
    debug!("Searching for first available tool among: {:?}", candidates);
    for candidate in &candidates {
        if let Some(path) = which(candidate) {
            trace!(
                "Found first available tool '{}' at path: {}",
                candidate,
                path
            );
            return Some(path);
        }
    }
    warn!("None of the candidate tools were found");
    None
}

pub async fn handle_stream<R: AsyncRead + Unpin>(reader: R, sender: UnboundedSender<String>) {
    let mut reader = io::BufReader::new(reader);
    let mut line = String::new();

    loop {
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("Reached end of stream");
                break;
            }
            Ok(n) if n > 0 => {
                if !line.trim().is_empty() {
                    let parts = line.split('\r');
                    let line = parts.last().unwrap_or(&line);
                    sender.send(line.to_string()).unwrap_or_else(|e| {
                        error!("Failed to send line to channel: {}", e);
                    });
                }
                line.clear();
            }
            Ok(_) => {
                // No bytes read, but not end of stream
                tokio::task::yield_now().await;
                continue;
            }
            Err(e) => {
                error!("Error reading line: {}", e);
                break;
            }
        }

        tokio::task::yield_now().await;
    }
}

pub async fn run_command(
    formatted_label: ColoredString,
    command: &str,
    args: Vec<&str>,
) -> Result<String, String> {
    let debug_args = args.join(" ");
    trace!("Running command: {} {}", command, debug_args);

    let (tx, mut rx): (UnboundedSender<String>, UnboundedReceiver<String>) =
        mpsc::unbounded_channel();
    let mut child = match TokioCommand::new(command)
        .args(&args)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => return Err(format!("Failed to spawn '{}': {}", command, e)),
    };

    let (stdout, stderr) = (child.stdout.take().unwrap(), child.stderr.take().unwrap());

    let stdout_task = tokio::spawn(handle_stream(stdout, tx.clone()));
    let stderr_task = tokio::spawn(handle_stream(stderr, tx));

    // Both senders drop once the reader tasks finish, which ends the loop.
    let mut lines = Vec::new();
    while let Some(line) = rx.recv().await {
        trace!("Received line: {}", line.trim_end());
        lines.push(line.trim_end().to_string());
        let clean_line = line.trim_end().replace(['\x1B', '\r', '\n'], "");
        println!("       {}  |   {}", formatted_label, clean_line);
    }

    let _ = tokio::join!(stdout_task, stderr_task);
    let output = lines.join("\n");
    lines.insert(0, "---".to_string());
    lines.insert(0, format!("Command: {} {}", command, debug_args));
    lines.insert(
        0,
        format!(
            "Working directory: {}",
            env::current_dir()
                .expect("Failed to get current directory")
                .display()
        ),
    );

    let status = match child.wait().await {
        Ok(status) => status,
        Err(e) => return Err(format!("Failed to wait for '{}': {}", command, e)),
    };
    if let Some(code) = status.code() {
        if code != 0 {
            error!("Command failed with exit code: {}", code);
            Err(lines.join("\n"))
        } else {
            trace!("Command completed successfully");
            Ok(output)
        }
    } else {
        error!("Command was terminated by a signal");
        Err(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colored::Colorize;

    // These run on tokio's default single-threaded test runtime, so they
    // also guard against the output drain starving the reader tasks.
    #[tokio::test]
    async fn run_command_captures_streamed_output() {
        let output = run_command(
            "test".white().bold(),
            "sh",
            vec!["-c", "echo first && echo second"],
        )
        .await
        .unwrap();
        assert!(output.contains("first"));
        assert!(output.contains("second"));
    }

    #[tokio::test]
    async fn run_command_reports_failing_commands() {
        let err = run_command(
            "test".white().bold(),
            "sh",
            vec!["-c", "echo diagnostics >&2; exit 3"],
        )
        .await
        .unwrap_err();
        assert!(err.contains("diagnostics"));
    }

    #[test]
    fn which_finds_common_tools_and_rejects_unknown_ones() {
        assert!(which("sh").is_some());
        assert!(which("definitely-not-a-real-tool-xyz").is_none());
        assert_eq!(first_which(vec!["definitely-not-a-real-tool-xyz", "sh"]), which("sh"));
    }
}
