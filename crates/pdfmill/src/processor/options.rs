//! Tuning options carried in a task's `finetune_args`.
//!
//! Parsing is lenient: a malformed document or an unknown value falls back to
//! the default for that field and logs a warning, it never fails the task.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParserEngine {
    #[default]
    Pipeline,
    VlmAutoEngine,
    VlmVllmEngine,
    VlmHttpClient,
    HybridAutoEngine,
    HybridVllmEngine,
    HybridHttpClient,
}

impl ParserEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParserEngine::Pipeline => "pipeline",
            ParserEngine::VlmAutoEngine => "vlm-auto-engine",
            ParserEngine::VlmVllmEngine => "vlm-vllm-engine",
            ParserEngine::VlmHttpClient => "vlm-http-client",
            ParserEngine::HybridAutoEngine => "hybrid-auto-engine",
            ParserEngine::HybridVllmEngine => "hybrid-vllm-engine",
            ParserEngine::HybridHttpClient => "hybrid-http-client",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParserPrefer {
    #[default]
    Auto,
    Txt,
    Ocr,
}

impl ParserPrefer {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParserPrefer::Auto => "auto",
            ParserPrefer::Txt => "txt",
            ParserPrefer::Ocr => "ocr",
        }
    }
}

/// OCR language packs understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetLanguage {
    Arabic,
    #[default]
    Ch,
    ChineseCht,
    ChLite,
    ChServer,
    Cyrillic,
    Devanagari,
    EastSlavic,
    El,
    En,
    Japan,
    Ka,
    Korean,
    Latin,
    Ta,
    Te,
    Th,
}

impl TargetLanguage {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetLanguage::Arabic => "arabic",
            TargetLanguage::Ch => "ch",
            TargetLanguage::ChineseCht => "chinese_cht",
            TargetLanguage::ChLite => "ch_lite",
            TargetLanguage::ChServer => "ch_server",
            TargetLanguage::Cyrillic => "cyrillic",
            TargetLanguage::Devanagari => "devanagari",
            TargetLanguage::EastSlavic => "east_slavic",
            TargetLanguage::El => "el",
            TargetLanguage::En => "en",
            TargetLanguage::Japan => "japan",
            TargetLanguage::Ka => "ka",
            TargetLanguage::Korean => "korean",
            TargetLanguage::Latin => "latin",
            TargetLanguage::Ta => "ta",
            TargetLanguage::Te => "te",
            TargetLanguage::Th => "th",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TuningOptions {
    pub parser_engine: ParserEngine,
    pub parser_prefer: ParserPrefer,
    pub target_language: TargetLanguage,
    pub enable_formula: bool,
    pub enable_table: bool,
}

impl TuningOptions {
    /// Interprets a serialized `finetune_args` document.
    pub fn parse_lenient(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return Self::default();
        }

        let fields = match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(fields)) => fields,
            Ok(other) => {
                warn!("Tuning options are not a JSON object ({}), using defaults", other);
                return Self::default();
            }
            Err(e) => {
                warn!("Malformed tuning options, using defaults: {}", e);
                return Self::default();
            }
        };

        let defaults = Self::default();
        Self {
            parser_engine: field(&fields, "parser_engine").unwrap_or(defaults.parser_engine),
            parser_prefer: field(&fields, "parser_prefer").unwrap_or(defaults.parser_prefer),
            target_language: field(&fields, "target_language")
                .unwrap_or(defaults.target_language),
            enable_formula: flag(&fields, "enable_formula").unwrap_or(defaults.enable_formula),
            enable_table: flag(&fields, "enable_table").unwrap_or(defaults.enable_table),
        }
    }

    /// Command-line flags understood by the extraction CLI.
    pub fn to_args(&self) -> Vec<String> {
        vec![
            "--backend".to_string(),
            self.parser_engine.as_str().to_string(),
            "--method".to_string(),
            self.parser_prefer.as_str().to_string(),
            "--lang".to_string(),
            self.target_language.as_str().to_string(),
            "--formula".to_string(),
            self.enable_formula.to_string(),
            "--table".to_string(),
            self.enable_table.to_string(),
        ]
    }
}

fn field<T: DeserializeOwned>(fields: &Map<String, Value>, key: &str) -> Option<T> {
    let value = fields.get(key).filter(|v| !v.is_null())?;
    match serde_json::from_value(value.clone()) {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!("Ignoring unknown value {} for tuning option '{}'", value, key);
            None
        }
    }
}

fn flag(fields: &Map<String, Value>, key: &str) -> Option<bool> {
    match fields.get(key)? {
        Value::Null => None,
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "yes" | "true" => Some(true),
            "no" | "false" => Some(false),
            _ => {
                warn!("Ignoring unknown value '{}' for tuning option '{}'", s, key);
                None
            }
        },
        other => {
            warn!("Ignoring unknown value {} for tuning option '{}'", other, key);
            None
        }
    }
}
