/// Attachment name of the run log file
pub const RUN_LOG_ATTACHMENT: &str = "run.log";

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Attachment {
    pub run_id: String,
    pub name: String,
    pub content_type: String,
    pub data: Vec<u8>,
    pub created_at: i64,
}
