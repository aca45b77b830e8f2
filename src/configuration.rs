use std::{path::PathBuf, time::Duration};

use serde_aux::field_attributes::{
    deserialize_bool_from_anything, deserialize_number_from_string,
};

use crate::services::{Backoff, RetryPolicy};

#[derive(serde::Deserialize, Clone, Debug)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub pipeline: PipelineSettings,
    pub proxy: ProxySettings,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct ApplicationSettings {
    pub search_url: String,
    pub webdriver_url: String,
    pub output_dir: PathBuf,
    pub keywords_dir: PathBuf,
    #[serde(deserialize_with = "deserialize_bool_from_anything")]
    pub headless: bool,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub batch_size: usize,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub initial_settle_secs: u64,
}

/// Seconds-based knobs; see `PipelineOptions` for what each one bounds.
#[derive(serde::Deserialize, Clone, Debug)]
pub struct PipelineSettings {
    #[serde(deserialize_with = "deserialize_bool_from_anything")]
    pub fetch_filing_documents: bool,
    #[serde(deserialize_with = "deserialize_bool_from_anything")]
    pub http_document_fallback: bool,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_documents_per_entity: usize,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub challenge_wait_secs: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub list_challenge_wait_secs: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub per_page_settle_secs: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub advance_settle_secs: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub results_wait_secs: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub detail_wait_secs: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub first_detail_wait_secs: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub modal_wait_secs: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub download_wait_secs: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub document_fetch_timeout_secs: u64,
    pub document_url: String,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct ProxySettings {
    pub url: Option<String>,
    pub list_file: Option<PathBuf>,
    pub deny_list_file: PathBuf,
    pub probe_url: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub probe_timeout_secs: u64,
}

/// Everything the navigation pipeline needs, passed in at construction.
#[derive(Clone, Debug)]
pub struct PipelineOptions {
    pub search_url: String,
    pub fetch_filing_documents: bool,
    pub http_document_fallback: bool,
    pub document_url: String,
    pub max_documents_per_entity: usize,
    /// Detail-level challenges block a whole entity, so they get the long budget.
    pub challenge_wait_budget: Duration,
    pub list_challenge_wait: Duration,
    pub per_page_settle_delay: Duration,
    pub advance_settle_delay: Duration,
    /// How long a page turn may take to show in the pager before it is reissued.
    pub page_turn_wait: Duration,
    pub results_wait: Duration,
    pub first_detail_wait: Duration,
    pub detail_wait: Duration,
    pub detail_retry_wait: Duration,
    pub row_click_wait: Duration,
    pub name_poll_attempts: u32,
    pub filing_settle_delay: Duration,
    pub filing_table_wait: Duration,
    pub modal_wait: Duration,
    pub modal_close_wait: Duration,
    pub download_wait: Duration,
    pub document_fetch_timeout: Duration,
    pub return_max_steps: u32,
    pub return_poll: Duration,
    pub form_retry: RetryPolicy,
    pub pager_retry: RetryPolicy,
    pub empty_page_retry: RetryPolicy,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            search_url: "https://ccfs.sos.wa.gov/#/AdvancedSearch".to_string(),
            fetch_filing_documents: true,
            http_document_fallback: true,
            document_url: "https://ccfs.sos.wa.gov/Common/DownloadFileByNumber".to_string(),
            max_documents_per_entity: 3,
            challenge_wait_budget: Duration::from_secs(300),
            list_challenge_wait: Duration::from_secs(60),
            per_page_settle_delay: Duration::from_secs(2),
            advance_settle_delay: Duration::from_secs(3),
            page_turn_wait: Duration::from_secs(10),
            results_wait: Duration::from_secs(30),
            first_detail_wait: Duration::from_secs(10),
            detail_wait: Duration::from_secs(5),
            detail_retry_wait: Duration::from_secs(20),
            row_click_wait: Duration::from_secs(15),
            name_poll_attempts: 15,
            filing_settle_delay: Duration::from_secs(3),
            filing_table_wait: Duration::from_secs(10),
            modal_wait: Duration::from_secs(45),
            modal_close_wait: Duration::from_secs(5),
            download_wait: Duration::from_secs(60),
            document_fetch_timeout: Duration::from_secs(90),
            return_max_steps: 3,
            return_poll: Duration::from_secs(10),
            form_retry: RetryPolicy::new(3, Backoff::Linear(Duration::from_secs(5))),
            pager_retry: RetryPolicy::new(6, Backoff::Fixed(Duration::from_secs(2))),
            empty_page_retry: RetryPolicy::new(4, Backoff::Linear(Duration::from_secs(5))),
        }
    }
}

impl Settings {
    pub fn pipeline_options(&self) -> PipelineOptions {
        let p = &self.pipeline;
        PipelineOptions {
            search_url: self.application.search_url.clone(),
            fetch_filing_documents: p.fetch_filing_documents,
            http_document_fallback: p.http_document_fallback,
            document_url: p.document_url.clone(),
            max_documents_per_entity: p.max_documents_per_entity,
            challenge_wait_budget: Duration::from_secs(p.challenge_wait_secs),
            list_challenge_wait: Duration::from_secs(p.list_challenge_wait_secs),
            per_page_settle_delay: Duration::from_secs(p.per_page_settle_secs),
            advance_settle_delay: Duration::from_secs(p.advance_settle_secs),
            results_wait: Duration::from_secs(p.results_wait_secs),
            first_detail_wait: Duration::from_secs(p.first_detail_wait_secs),
            detail_wait: Duration::from_secs(p.detail_wait_secs),
            modal_wait: Duration::from_secs(p.modal_wait_secs),
            download_wait: Duration::from_secs(p.download_wait_secs),
            document_fetch_timeout: Duration::from_secs(p.document_fetch_timeout_secs),
            ..PipelineOptions::default()
        }
    }

    pub fn initial_settle_delay(&self) -> Duration {
        Duration::from_secs(self.application.initial_settle_secs)
    }
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let base_path = std::env::current_dir().map_err(|e| {
        config::ConfigError::Message(format!("Failed to determine the current directory: {}", e))
    })?;
    let configuration_directory = base_path.join("configuration");

    let settings = config::Config::builder()
        .add_source(config::File::from(configuration_directory.join("base.yaml")))
        .add_source(config::File::from(configuration_directory.join("local.yaml")).required(false))
        .add_source(
            config::Environment::with_prefix("SCOUT")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize::<Settings>()
}
