use crate::index::IndexStats;
use crate::symbol::{SymbolOccurrence, SymbolRelation};
use chrono::Utc;
use clap::ValueEnum;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;

const SCHEMA_VERSION: &str = "1.0.0";

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
    Pretty,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            OutputFormat::Human => "human",
            OutputFormat::Json => "json",
            OutputFormat::Pretty => "pretty",
        };
        write!(f, "{}", value)
    }
}

#[derive(Serialize)]
pub struct JsonResponse<T> {
    pub schema_version: &'static str,
    pub execution_id: String,
    pub tool: &'static str,
    pub timestamp: String,
    pub partial: bool,
    pub data: T,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub error: String,
    pub message: String,
    pub remediation: Option<String>,
}

#[derive(Serialize)]
pub struct RelationMatch {
    pub roles: Vec<&'static str>,
    pub usr: String,
    pub name: String,
}

impl RelationMatch {
    pub fn from_relation(relation: &SymbolRelation) -> Self {
        Self {
            roles: relation.roles().names(),
            usr: relation.symbol().usr().to_string(),
            name: relation.symbol().name().to_string(),
        }
    }
}

#[derive(Serialize)]
pub struct OccurrenceMatch {
    pub match_id: String,
    pub usr: String,
    pub name: String,
    pub kind: &'static str,
    pub path: String,
    pub line: u32,
    pub column: u32,
    pub is_system: bool,
    pub roles: Vec<&'static str>,
    pub role_bits: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub relations: Vec<RelationMatch>,
}

impl OccurrenceMatch {
    pub fn from_occurrence(occurrence: &SymbolOccurrence) -> Self {
        let symbol = occurrence.symbol();
        let location = occurrence.location();
        Self {
            match_id: match_id(symbol.usr(), location.path(), location.line(), location.column_utf8()),
            usr: symbol.usr().to_string(),
            name: symbol.name().to_string(),
            kind: symbol.kind().label(),
            path: location.path().to_string(),
            line: location.line(),
            column: location.column_utf8(),
            is_system: location.is_system(),
            roles: occurrence.roles().names(),
            role_bits: occurrence.roles().bits(),
            relations: occurrence
                .relations()
                .iter()
                .map(RelationMatch::from_relation)
                .collect(),
        }
    }
}

#[derive(Serialize)]
pub struct OccurrenceResponse {
    pub results: Vec<OccurrenceMatch>,
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_filter: Option<String>,
    pub total_count: u64,
}

#[derive(Serialize)]
pub struct NameResponse {
    pub results: Vec<String>,
    pub total_count: u64,
}

#[derive(Serialize)]
pub struct KindCountResponse {
    pub kind: &'static str,
    pub workspace_only: bool,
    pub total_count: u64,
}

#[derive(Serialize)]
pub struct StatsResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library: Option<String>,
    #[serde(flatten)]
    pub stats: IndexStats,
}

pub fn json_response<T>(data: T) -> JsonResponse<T> {
    json_response_with_partial(data, false)
}

pub fn json_response_with_partial<T>(data: T, partial: bool) -> JsonResponse<T> {
    JsonResponse {
        schema_version: SCHEMA_VERSION,
        execution_id: execution_id(),
        tool: "symdb",
        timestamp: Utc::now().to_rfc3339(),
        partial,
        data,
    }
}

pub fn execution_id() -> String {
    let timestamp = Utc::now().timestamp();
    let pid = std::process::id();
    format!("{:x}-{:x}", timestamp, pid)
}

/// Stable identifier of one occurrence in output.
pub fn match_id(usr: &str, path: &str, line: u32, column: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(usr.as_bytes());
    hasher.update(b":");
    hasher.update(path.as_bytes());
    hasher.update(b":");
    hasher.update(line.to_string().as_bytes());
    hasher.update(b":");
    hasher.update(column.to_string().as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..8])
}
