//! Turning a platform record into a finished PDF.
//!
//! A request carries nothing but a browser URL copied from the platform web
//! UI. The URL is parsed into a [`RecordRef`] (project, section, optional
//! record id), the relevant records are fetched through the authenticated
//! gateway, and a template workbook is filled in and exported through the
//! configured sheet engine.

pub mod cost_cover;
pub mod mapping;

use std::path::PathBuf;
use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::auth::{ApiGateway, AuthError};
use crate::config::PlatformConfig;
use crate::sheet::{create_backend, CellValue, ExportOptions, SheetError};

pub use mapping::CellMap;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("no project id found in the URL")]
    NoProjectId,
    #[error("the URL does not point at a budgets, costs, or forms page")]
    UnknownSection,
    #[error("no matching payments in the container")]
    NoPayments,
    #[error("cell map: {0}")]
    Mapping(String),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Sheet(#[from] SheetError),
    #[error("render task failed: {0}")]
    Canceled(String),
}

/// Which part of the platform the URL points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Budgets,
    Costs,
    Forms,
}

lazy_static! {
    static ref PROJECT_ID: Regex =
        Regex::new(r"projects/([0-9a-fA-F][0-9a-fA-F-]{34}[0-9a-fA-F])").unwrap();
    static ref UUID: Regex = Regex::new(
        r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$"
    )
    .unwrap();
}

/// A parsed platform URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordRef {
    pub project_id: String,
    pub section: Section,
    /// Specific cost record, when the URL selects one.
    pub cost_id: Option<String>,
}

impl RecordRef {
    pub fn parse(url: &str) -> Result<Self, RenderError> {
        let project_id = PROJECT_ID
            .captures(url)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or(RenderError::NoProjectId)?;

        let (path, query) = match url.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (url, None),
        };

        // "/cost/cost" before "/budget": the cost page URL also contains
        // the word "cost" in its budget-management sibling paths.
        let section = if path.contains("/cost/cost") {
            Section::Costs
        } else if path.contains("/budget") {
            Section::Budgets
        } else if path.contains("/forms") {
            Section::Forms
        } else {
            return Err(RenderError::UnknownSection);
        };

        let cost_id = if section == Section::Costs {
            extract_cost_id(path, query, &project_id)
        } else {
            None
        };

        Ok(Self {
            project_id,
            section,
            cost_id,
        })
    }
}

/// The selected cost record id, from `preview`/`selectId` query parameters
/// or a trailing path segment. The project id segment never counts.
fn extract_cost_id(path: &str, query: Option<&str>, project_id: &str) -> Option<String> {
    if let Some(query) = query {
        for pair in query.split('&') {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            if (key == "preview" || key == "selectId") && UUID.is_match(value) {
                return Some(value.to_string());
            }
        }
    }
    path.rsplit('/')
        .next()
        .filter(|last| UUID.is_match(last) && !last.eq_ignore_ascii_case(project_id))
        .map(str::to_string)
}

/// One pending edit against a workbook.
#[derive(Debug, Clone)]
pub enum SheetOp {
    Write(String, CellValue),
    InsertRow(u32),
}

/// A fully-planned render: template, ordered edits, output identity. Planning
/// is async (API fetches); execution is blocking (subprocesses) and runs on
/// the blocking pool.
#[derive(Debug)]
pub struct RenderJob {
    pub template: PathBuf,
    pub workbook_stem: String,
    pub ops: Vec<SheetOp>,
    pub pdf_name: String,
}

impl RenderJob {
    pub fn new(template: PathBuf, workbook_stem: &str) -> Self {
        Self {
            template,
            workbook_stem: workbook_stem.to_string(),
            ops: Vec::new(),
            pdf_name: format!("{workbook_stem}.pdf"),
        }
    }

    pub fn write(&mut self, cell: impl Into<String>, value: impl Into<CellValue>) {
        self.ops.push(SheetOp::Write(cell.into(), value.into()));
    }

    pub fn insert_row(&mut self, index: u32) {
        self.ops.push(SheetOp::InsertRow(index));
    }

    fn execute(self, config: &PlatformConfig) -> Result<PathBuf, RenderError> {
        let mut backend = create_backend(config, &self.template, &self.workbook_stem);
        let result = (|| {
            backend.open()?;
            for op in &self.ops {
                match op {
                    SheetOp::Write(cell, value) => backend.write_cell(cell, value.clone())?,
                    SheetOp::InsertRow(index) => backend.insert_row(*index)?,
                }
            }
            backend.export_pdf(&ExportOptions {
                pdf_name: self.pdf_name.clone(),
            })
        })();
        // The workbook is released no matter how the edits went.
        backend.close();
        result.map_err(RenderError::from)
    }
}

/// A finished PDF plus what the publisher needs to file it.
#[derive(Debug)]
pub struct RenderedArtifact {
    pub pdf_path: PathBuf,
    pub project_name: Option<String>,
    pub category: &'static str,
    pub filename: String,
}

pub struct Renderer {
    pub(crate) config: Arc<PlatformConfig>,
    pub(crate) gateway: Arc<ApiGateway>,
    pub(crate) map: CellMap,
}

impl Renderer {
    pub fn new(config: Arc<PlatformConfig>, gateway: Arc<ApiGateway>) -> Result<Self, RenderError> {
        let map = CellMap::load(config.cell_map_file.as_deref())?;
        Ok(Self {
            config,
            gateway,
            map,
        })
    }

    pub async fn render(&self, reference: &str) -> Result<RenderedArtifact, RenderError> {
        let record = RecordRef::parse(reference)?;
        log::info!(
            "rendering {:?} for project {}",
            record.section,
            record.project_id
        );
        match record.section {
            Section::Budgets => self.render_budgets(&record).await,
            Section::Forms => self.render_forms(&record).await,
            Section::Costs => cost_cover::render(self, &record).await,
        }
    }

    /// Budget listing: one row per budget line, appended under the table
    /// header so the template footer keeps its formatting.
    async fn render_budgets(&self, record: &RecordRef) -> Result<RenderedArtifact, RenderError> {
        let endpoint = cost_endpoint(&record.project_id, "budgets");
        let body = self.gateway.call(&endpoint, &[]).await?;
        let rows = result_rows(&body);

        let map = &self.map.budgets;
        let mut job = RenderJob::new(
            self.config.template_dir.join("budgets_template.xlsx"),
            "budgets",
        );
        for (i, item) in rows.iter().enumerate() {
            let row = map.start_row + i as u32;
            if i > 0 {
                job.insert_row(row);
            }
            if let Some(code) = item["code"].as_str() {
                job.write(format!("{}{row}", map.code_col), code);
            }
            if let Some(name) = item["name"].as_str() {
                job.write(format!("{}{row}", map.name_col), name);
            }
            if let Some(price) = number_field(&item["unitPrice"]) {
                job.write(format!("{}{row}", map.unit_price_col), price);
            }
        }

        let pdf_path = self.execute(job).await?;
        Ok(RenderedArtifact {
            pdf_path,
            project_name: self.project_name(&record.project_id).await,
            category: "Reports",
            filename: "budgets.pdf".to_string(),
        })
    }

    async fn render_forms(&self, record: &RecordRef) -> Result<RenderedArtifact, RenderError> {
        let endpoint = format!(
            "construction/forms/v1/projects/{}/forms",
            record.project_id
        );
        let body = self.gateway.call(&endpoint, &[]).await?;
        let rows = result_rows(&body);

        let map = &self.map.forms;
        let mut job = RenderJob::new(
            self.config.template_dir.join("forms_template.xlsx"),
            "forms",
        );
        job.write(format!("{}{}", map.id_col, map.header_row), "Form Id");
        job.write(format!("{}{}", map.name_col, map.header_row), "Form Name");
        job.write(format!("{}{}", map.status_col, map.header_row), "Status");
        for (i, form) in rows.iter().enumerate() {
            let row = map.start_row + i as u32;
            if i > 0 {
                job.insert_row(row);
            }
            if let Some(id) = form["id"].as_str() {
                job.write(format!("{}{row}", map.id_col), id);
            }
            if let Some(name) = form["name"].as_str() {
                job.write(format!("{}{row}", map.name_col), name);
            }
            if let Some(status) = form["status"].as_str() {
                job.write(format!("{}{row}", map.status_col), status);
            }
        }

        let pdf_path = self.execute(job).await?;
        Ok(RenderedArtifact {
            pdf_path,
            project_name: self.project_name(&record.project_id).await,
            category: "Reports",
            filename: "forms.pdf".to_string(),
        })
    }

    pub(crate) async fn execute(&self, job: RenderJob) -> Result<PathBuf, RenderError> {
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || job.execute(&config))
            .await
            .map_err(|e| RenderError::Canceled(e.to_string()))?
    }

    /// Best-effort: a render without a project name still produces a PDF,
    /// it just cannot be filed under a project folder.
    pub(crate) async fn project_name(&self, project_id: &str) -> Option<String> {
        let endpoint = format!("construction/admin/v1/projects/{project_id}");
        match self.gateway.call(&endpoint, &[]).await {
            Ok(body) => body["name"].as_str().map(str::to_string),
            Err(e) => {
                log::warn!("could not fetch project name for {project_id}: {e}");
                None
            }
        }
    }
}

/// Cost endpoints are container-scoped; on this platform the cost container
/// id is the project id, so the container always comes from the URL being
/// rendered, never from configuration.
pub(crate) fn cost_endpoint(project_id: &str, resource: &str) -> String {
    format!("cost/v1/containers/{project_id}/{resource}")
}

/// Platform list endpoints wrap rows in either `results` or `data`.
pub(crate) fn result_rows(body: &Value) -> Vec<Value> {
    body["results"]
        .as_array()
        .or_else(|| body["data"].as_array())
        .cloned()
        .unwrap_or_default()
}

pub(crate) fn number_field(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}
