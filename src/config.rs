use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the backup extraction pipeline.
///
/// All knobs are read at construction time; individual services take what
/// they need. Category mapping and discovery settings mirror the platform's
/// backup configuration.
#[derive(Debug, Clone)]
pub struct BackupConfig {
    /// Rows per page for chunked extraction
    pub chunk_size: usize,
    /// Row count above which a table is streamed instead of chunked
    pub streaming_threshold: usize,
    /// Process memory limit for extraction, in MB. None means unbounded.
    pub memory_limit_mb: Option<u64>,
    /// Soft memory threshold (percent of limit) — re-measure above this
    pub memory_soft_percent: u8,
    /// Hard memory threshold (percent of limit) — abort above this
    pub memory_hard_percent: u8,
    /// Absolute memory ceiling for the large-table cursor path, in MB
    pub large_table_memory_limit_mb: u64,
    /// Abort a whole-org run once this many tables have failed
    pub max_table_failures: usize,
    /// Temp directory for downloaded remote files and packages
    pub temp_storage_path: PathBuf,
    /// Remote files larger than this are skipped, not downloaded
    pub max_remote_file_size_bytes: u64,
    /// Timeout for the HEAD metadata probe
    pub remote_probe_timeout: Duration,
    /// Timeout for the full body download
    pub remote_download_timeout: Duration,
    /// Explicit category -> qualified table names mapping
    pub category_mapping: Vec<(String, Vec<String>)>,
    /// Category key -> human label
    pub category_labels: HashMap<String, String>,
    /// Substring patterns used to auto-categorize unmapped tables
    pub category_patterns: Vec<(String, Vec<String>)>,
    /// Schemas scanned for org-scoped tables
    pub discovery_schemas: Vec<String>,
    /// Tables never included in a backup
    pub excluded_tables: Vec<String>,
    /// Storage prefixes that mark a string value as a file reference
    pub storage_prefixes: Vec<String>,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            streaming_threshold: 10_000,
            memory_limit_mb: Some(512),
            memory_soft_percent: 80,
            memory_hard_percent: 95,
            large_table_memory_limit_mb: 512,
            max_table_failures: 10,
            temp_storage_path: std::env::temp_dir().join("cmis-backups"),
            max_remote_file_size_bytes: 100 * 1024 * 1024,
            remote_probe_timeout: Duration::from_secs(10),
            remote_download_timeout: Duration::from_secs(60),
            category_mapping: default_category_mapping(),
            category_labels: default_category_labels(),
            category_patterns: default_category_patterns(),
            discovery_schemas: vec![
                "cmis".into(),
                "cmis_ai".into(),
                "cmis_analytics".into(),
                "cmis_creative".into(),
                "cmis_platform".into(),
            ],
            excluded_tables: vec![
                "cmis.backup_audit_logs".into(),
                "cmis.backup_encryption_keys".into(),
                "cmis.backup_restores".into(),
                "cmis.backup_schedules".into(),
                "cmis.backup_settings".into(),
                "cmis.organization_backups".into(),
                "cmis.migrations".into(),
                "cmis.failed_jobs".into(),
                "cmis.jobs".into(),
                "cmis.sessions".into(),
                "cmis.cache".into(),
                "cmis.password_reset_tokens".into(),
            ],
            storage_prefixes: vec![
                "storage/".into(),
                "uploads/".into(),
                "media/".into(),
                "assets/".into(),
            ],
        }
    }
}

fn default_category_mapping() -> Vec<(String, Vec<String>)> {
    let map: &[(&str, &[&str])] = &[
        (
            "campaigns",
            &[
                "cmis.campaigns",
                "cmis.campaign_objectives",
                "cmis.campaign_budgets",
                "cmis.campaign_schedules",
                "cmis.campaign_targeting",
            ],
        ),
        (
            "ad_content",
            &[
                "cmis.ad_creatives",
                "cmis.ad_copies",
                "cmis.ad_media",
                "cmis.creative_assets",
            ],
        ),
        (
            "audiences",
            &[
                "cmis.audiences",
                "cmis.audience_segments",
                "cmis.audience_rules",
                "cmis.custom_audiences",
            ],
        ),
        (
            "analytics",
            &[
                "cmis.unified_metrics",
                "cmis.analytics_reports",
                "cmis.performance_summaries",
            ],
        ),
        (
            "social_posts",
            &[
                "cmis.social_posts",
                "cmis.post_schedules",
                "cmis.post_media",
                "cmis.post_comments",
            ],
        ),
        (
            "content_plans",
            &[
                "cmis_creative.content_plans",
                "cmis_creative.content_plan_items",
                "cmis_creative.content_calendars",
            ],
        ),
        (
            "integrations",
            &[
                "cmis_platform.platform_connections",
                "cmis_platform.platform_credentials",
                "cmis_platform.ad_accounts",
            ],
        ),
        (
            "team_settings",
            &[
                "cmis.org_settings",
                "cmis.org_members",
                "cmis.org_roles",
                "cmis.org_permissions",
            ],
        ),
        (
            "automations",
            &[
                "cmis.automation_rules",
                "cmis.automation_triggers",
                "cmis.automation_actions",
                "cmis.automation_logs",
            ],
        ),
        (
            "reports",
            &[
                "cmis.saved_reports",
                "cmis.report_schedules",
                "cmis.report_templates",
                "cmis.dashboards",
            ],
        ),
    ];

    map.iter()
        .map(|(key, tables)| {
            (
                key.to_string(),
                tables.iter().map(|t| t.to_string()).collect(),
            )
        })
        .collect()
}

fn default_category_labels() -> HashMap<String, String> {
    [
        ("campaigns", "Campaigns"),
        ("ad_content", "Ad Content"),
        ("audiences", "Audiences"),
        ("analytics", "Analytics"),
        ("social_posts", "Social Posts"),
        ("content_plans", "Content Plans"),
        ("integrations", "Integrations"),
        ("team_settings", "Team & Settings"),
        ("automations", "Automations"),
        ("reports", "Reports"),
        ("other", "Other"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn default_category_patterns() -> Vec<(String, Vec<String>)> {
    let patterns: &[(&str, &[&str])] = &[
        ("campaigns", &["campaign", "ad_set", "ad_group", "ad_"]),
        ("social_posts", &["social_post", "post_media", "post_comment"]),
        ("analytics", &["metric", "analytics", "report", "performance"]),
        ("audiences", &["audience", "segment", "targeting"]),
        (
            "integrations",
            &["integration", "connection", "credential", "platform_"],
        ),
        ("automations", &["automation", "trigger", "action", "rule"]),
    ];

    patterns
        .iter()
        .map(|(key, pats)| {
            (
                key.to_string(),
                pats.iter().map(|p| p.to_string()).collect(),
            )
        })
        .collect()
}
