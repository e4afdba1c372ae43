//! Automation engine: a live spreadsheet application driven through a bridge
//! subprocess.
//!
//! The bridge speaks line-delimited JSON on stdin/stdout: one request per
//! line, one reply per line. Cell writes are resolved against merge areas by
//! the application itself, row insertion uses the native shift-down
//! primitive, and PDF export uses the application's fixed-format export with
//! page setup forced to one page wide/tall and zoom disabled. `close`
//! terminates the application process; skipping it leaks a process per job.

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use serde::{Deserialize, Serialize};

use super::model::CellValue;
use super::{ensure_exportable, ensure_writable, ExportOptions, SheetBackend, SheetError, WorkbookState};

#[derive(Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum BridgeCommand<'a> {
    Open {
        path: &'a str,
    },
    WriteCell {
        cell: &'a str,
        value: &'a CellValue,
    },
    InsertRow {
        row: u32,
    },
    ExportPdf {
        path: &'a str,
        fit_to_page: bool,
    },
    Close,
}

#[derive(Deserialize)]
struct BridgeReply {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    path: Option<String>,
}

struct Bridge {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl Bridge {
    fn spawn(cmd: &str) -> Result<Self, SheetError> {
        let mut child = Command::new(cmd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(SheetError::ConverterSpawn)?;
        let stdin = child.stdin.take().expect("stdin was piped");
        let stdout = BufReader::new(child.stdout.take().expect("stdout was piped"));
        Ok(Self {
            child,
            stdin,
            stdout,
        })
    }

    fn send(&mut self, command: &BridgeCommand<'_>) -> Result<BridgeReply, SheetError> {
        let line = serde_json::to_string(command)
            .map_err(|e| SheetError::Bridge(format!("encode request: {e}")))?;
        writeln!(self.stdin, "{line}")
            .and_then(|_| self.stdin.flush())
            .map_err(|e| SheetError::Bridge(format!("send request: {e}")))?;

        let mut reply = String::new();
        self.stdout
            .read_line(&mut reply)
            .map_err(|e| SheetError::Bridge(format!("read reply: {e}")))?;
        if reply.is_empty() {
            return Err(SheetError::Bridge("bridge process exited".to_string()));
        }
        let reply: BridgeReply = serde_json::from_str(&reply)
            .map_err(|e| SheetError::Bridge(format!("decode reply: {e}")))?;
        if !reply.ok {
            return Err(SheetError::Bridge(
                reply.error.unwrap_or_else(|| "unspecified".to_string()),
            ));
        }
        Ok(reply)
    }

    fn terminate(mut self) {
        let _ = self.send(&BridgeCommand::Close);
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub struct AutomationBackend {
    template_path: PathBuf,
    output_dir: PathBuf,
    bridge_cmd: String,
    bridge: Option<Bridge>,
    state: WorkbookState,
}

impl AutomationBackend {
    pub fn new(template_path: &Path, output_dir: &Path, bridge_cmd: &str) -> Self {
        Self {
            template_path: template_path.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            bridge_cmd: bridge_cmd.to_string(),
            bridge: None,
            state: WorkbookState::Closed,
        }
    }

    fn bridge(&mut self) -> &mut Bridge {
        self.bridge.as_mut().expect("open state implies a bridge")
    }
}

impl SheetBackend for AutomationBackend {
    fn open(&mut self) -> Result<(), SheetError> {
        if !self.template_path.exists() {
            return Err(SheetError::TemplateMissing(self.template_path.clone()));
        }
        let mut bridge = Bridge::spawn(&self.bridge_cmd)?;
        let path = self.template_path.display().to_string();
        bridge.send(&BridgeCommand::Open { path: &path })?;
        self.bridge = Some(bridge);
        self.state = WorkbookState::Open;
        Ok(())
    }

    fn write_cell(&mut self, cell: &str, value: CellValue) -> Result<(), SheetError> {
        ensure_writable("write_cell", self.state)?;
        self.bridge()
            .send(&BridgeCommand::WriteCell { cell, value: &value })?;
        self.state = WorkbookState::Modified;
        Ok(())
    }

    fn insert_row(&mut self, index: u32) -> Result<(), SheetError> {
        ensure_writable("insert_row", self.state)?;
        self.bridge().send(&BridgeCommand::InsertRow { row: index })?;
        self.state = WorkbookState::Modified;
        Ok(())
    }

    fn export_pdf(&mut self, options: &ExportOptions) -> Result<PathBuf, SheetError> {
        ensure_exportable("export_pdf", self.state)?;
        std::fs::create_dir_all(&self.output_dir)?;
        let target = self.output_dir.join(&options.pdf_name);
        let target_str = target.display().to_string();
        let reply = self.bridge().send(&BridgeCommand::ExportPdf {
            path: &target_str,
            fit_to_page: true,
        })?;
        let exported = reply.path.map(PathBuf::from).unwrap_or(target);
        // A missing file is a failed export; the workbook stays writable so
        // the caller can retry or close.
        if !exported.exists() {
            return Err(SheetError::ConverterNoOutput(exported));
        }
        self.state = WorkbookState::Exported;
        Ok(exported.canonicalize().unwrap_or(exported))
    }

    fn close(&mut self) {
        if let Some(bridge) = self.bridge.take() {
            bridge.terminate();
        }
        self.state = WorkbookState::Closed;
    }
}

impl Drop for AutomationBackend {
    fn drop(&mut self) {
        self.close();
    }
}
