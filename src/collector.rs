//! Metric acquisition
//!
//! The ingest service exposes three CSV resources per repository. A
//! [`MetricsSource`] fetches them as text; [`Collector`] parses them, keeps an
//! explicit cache of the full commit table and computes quantile summaries.

use crate::metrics_table::{MetricsTable, TableError};
use crate::output::{QuantileTable, Quantiles};
use crate::schema::{DATE_COLUMN, ID_COLUMN, LABEL_COLUMN};
use crate::stats;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("Missing authentication for the ingest service")]
    MissingAuth,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Malformed metrics table: {0}")]
    Table(#[from] TableError),

    #[error("Quantile calculation failed for column '{column}': {message}")]
    Quantile { column: String, message: String },
}

pub type Result<T> = std::result::Result<T, CollectorError>;

/// CSV resources published per repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricsResource {
    CommitMetrics,
    FileAggregated,
    DeveloperAggregated,
}

impl MetricsResource {
    pub fn file_name(&self) -> &'static str {
        match self {
            MetricsResource::CommitMetrics => "metrics.csv",
            MetricsResource::FileAggregated => "file_aggregated_metrics.csv",
            MetricsResource::DeveloperAggregated => "developer_aggregated_metrics.csv",
        }
    }
}

/// Optional job-id range restricting the commits returned
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobFilter {
    pub start_job: Option<String>,
    pub last_job: Option<String>,
}

impl JobFilter {
    /// Keep only the upper bound
    pub fn up_to_last(&self) -> Self {
        Self {
            start_job: None,
            last_job: self.last_job.clone(),
        }
    }

    pub fn query_pairs(&self) -> Vec<(&'static str, &str)> {
        let mut pairs = Vec::new();
        if let Some(start) = self.start_job.as_deref().filter(|s| !s.is_empty()) {
            pairs.push(("start_job", start));
        }
        if let Some(last) = self.last_job.as_deref().filter(|s| !s.is_empty()) {
            pairs.push(("last_job", last));
        }
        pairs
    }
}

/// Supplier of raw CSV text for a resource
pub trait MetricsSource {
    fn fetch(&self, resource: MetricsResource, filter: &JobFilter) -> Result<String>;
}

/// Ingest service over HTTP
pub struct HttpSource {
    client: reqwest::blocking::Client,
    repo_url: String,
    auth: String,
}

impl HttpSource {
    /// `auth` is sent verbatim as the `Authorization` header
    pub fn new(ingest_url: &str, repo_id: &str, auth: Option<&str>) -> Result<Self> {
        let auth = auth
            .filter(|a| !a.trim().is_empty())
            .ok_or(CollectorError::MissingAuth)?;

        let base = ingest_url.strip_suffix('/').unwrap_or(ingest_url);
        Ok(Self {
            client: reqwest::blocking::Client::builder().build()?,
            repo_url: format!("{}/repositories/{}", base, repo_id),
            auth: auth.to_string(),
        })
    }

    pub fn url_for(&self, resource: MetricsResource) -> String {
        format!("{}/{}", self.repo_url, resource.file_name())
    }
}

impl MetricsSource for HttpSource {
    fn fetch(&self, resource: MetricsResource, filter: &JobFilter) -> Result<String> {
        let url = self.url_for(resource);
        tracing::debug!("GET {} {:?}", url, filter.query_pairs());

        let response = self
            .client
            .get(&url)
            .query(&filter.query_pairs())
            .header(reqwest::header::AUTHORIZATION, self.auth.as_str())
            .send()?
            .error_for_status()?;
        Ok(response.text()?)
    }
}

/// Resources read from files in a local directory; job filters are ignored
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl MetricsSource for DirectorySource {
    fn fetch(&self, resource: MetricsResource, _filter: &JobFilter) -> Result<String> {
        let path = self.dir.join(resource.file_name());
        tracing::debug!("Reading {}", path.display());
        std::fs::read_to_string(&path).map_err(|source| CollectorError::Io {
            path: path.display().to_string(),
            source,
        })
    }
}

/// Parsed access to one repository's metrics
pub struct Collector<S: MetricsSource> {
    source: S,
    jobs: JobFilter,
    quantile_steps: Vec<f64>,
    all_commits: Option<MetricsTable>,
}

impl<S: MetricsSource> Collector<S> {
    pub fn new(source: S, jobs: JobFilter, quantile_steps: Vec<f64>) -> Self {
        Self {
            source,
            jobs,
            quantile_steps,
            all_commits: None,
        }
    }

    /// Every commit up to the last job; with `cache` the table is kept until
    /// [`invalidate`](Self::invalidate)
    pub fn all_commit_metrics(&mut self, cache: bool) -> Result<MetricsTable> {
        if let Some(table) = &self.all_commits {
            tracing::debug!("All commit metrics served from cache");
            return Ok(table.clone());
        }

        let table = self.fetch_table(MetricsResource::CommitMetrics, &self.jobs.up_to_last())?;
        tracing::info!("Fetched {} commit metric rows", table.len());
        if cache {
            self.all_commits = Some(table.clone());
        }
        Ok(table)
    }

    /// Commits of the configured job range; never cached
    pub fn job_commit_metrics(&self) -> Result<MetricsTable> {
        let table = self.fetch_table(MetricsResource::CommitMetrics, &self.jobs)?;
        tracing::info!("Fetched {} job commit metric rows", table.len());
        Ok(table)
    }

    pub fn file_aggregated_metrics(&self) -> Result<MetricsTable> {
        self.fetch_table(MetricsResource::FileAggregated, &JobFilter::default())
    }

    pub fn developer_aggregated_metrics(&self) -> Result<MetricsTable> {
        self.fetch_table(MetricsResource::DeveloperAggregated, &JobFilter::default())
    }

    /// Drop the cached commit table
    pub fn invalidate(&mut self) {
        self.all_commits = None;
    }

    pub fn is_cached(&self) -> bool {
        self.all_commits.is_some()
    }

    /// Quantile summaries of commit, file and developer metrics
    ///
    /// Fetches the full commit table through the cache.
    pub fn metrics_quantiles(&mut self) -> Result<Quantiles> {
        let commits = self.all_commit_metrics(true)?;
        let commit = self.quantile_table(&commits, &[ID_COLUMN, DATE_COLUMN, LABEL_COLUMN])?;
        let file = self.quantile_table(&self.file_aggregated_metrics()?, &[])?;
        let developer = self.quantile_table(&self.developer_aggregated_metrics()?, &[])?;

        Ok(Quantiles {
            commit,
            file,
            developer,
        })
    }

    fn quantile_table(&self, table: &MetricsTable, excluded: &[&str]) -> Result<QuantileTable> {
        let mut out = QuantileTable::new();
        for q in &self.quantile_steps {
            out.entry(format!("{}", q)).or_default();
        }

        for (column, values) in table.numeric_columns(excluded) {
            let present: Vec<f64> = values.into_iter().flatten().collect();
            if present.is_empty() {
                continue;
            }

            for &q in &self.quantile_steps {
                let value = stats::quantile(&present, q).map_err(|e| CollectorError::Quantile {
                    column: column.clone(),
                    message: e.to_string(),
                })?;
                out.entry(format!("{}", q))
                    .or_default()
                    .insert(column.clone(), value);
            }
        }
        Ok(out)
    }

    fn fetch_table(&self, resource: MetricsResource, filter: &JobFilter) -> Result<MetricsTable> {
        let text = self.source.fetch(resource, filter)?;
        Ok(MetricsTable::parse(&text)?)
    }
}
