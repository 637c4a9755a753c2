//! # 블록 콘텐츠 유틸리티
//!
//! 문자열을 받아 문자열을 돌려주는 순수 함수들입니다. DB나 HTTP에 의존하지 않습니다.
//!
//! - `validate_block_id()` / `validate_content()`: 저장 전에 입력을 거릅니다
//! - `normalize_for_comparison()`: 동등 비교용 정규화 (저장되는 값은 바꾸지 않음)
//! - `decode_block_content()`: 편집기가 보낸 이스케이프된 콘텐츠 복원
//! - `content_hash()`: 정규화된 콘텐츠의 SHA-256
//! - `Sanitizer`: 허용된 HTML 부분집합만 남기는 외부 협력자 인터페이스

use crate::error::AppError;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use sha2::{Digest, Sha256};

static BLOCK_ID_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid block id regex"));

static ENTITY_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[A-Za-z]{2,8});").expect("valid entity regex")
});

static TAG_WHITESPACE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*(<[^>]+>)\s*").expect("valid tag regex"));

static INLINE_SPACE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ \t]+").expect("valid space regex"));

static INVISIBLE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x{200B}-\x{200D}\x{FEFF}]").expect("valid invisible regex"));

// <br/>, <br />, <hr   /> 등 void 요소의 표기를 하나로 맞춘다
static VOID_TAG_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<(br|hr|img|input|wbr)((?:\s+[^>]*?)?)\s*/?>").expect("valid void tag regex")
});

static UNICODE_ESCAPE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\u([0-9a-fA-F]{4})").expect("valid escape regex"));

// 백슬래시가 사라진 마크업 문자 이스케이프 (u003c, u003e, u0026, u0022, u0027)
static BARE_MARKUP_ESCAPE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"u00(3[cCeE]|26|22|27)").expect("valid bare escape regex"));

static SCRIPT_STYLE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)\s*>").expect("valid script regex")
});

static EVENT_HANDLER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\s+on[a-z]+\s*=\s*("[^"]*"|'[^']*'|[^\s>]+)"#).expect("valid handler regex")
});

static JS_URL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b(href|src)\s*=\s*("\s*javascript:[^"]*"|'\s*javascript:[^']*')"#)
        .expect("valid js url regex")
});

/// block_id는 영숫자, 하이픈, 밑줄만 허용합니다.
pub fn validate_block_id(block_id: &str) -> Result<(), AppError> {
    if block_id.is_empty() {
        return Err(AppError::BadRequest("Missing block ID".to_string()));
    }
    if !BLOCK_ID_REGEX.is_match(block_id) {
        return Err(AppError::BadRequest("Invalid block ID format".to_string()));
    }
    Ok(())
}

pub fn validate_content(content: &str) -> Result<(), AppError> {
    if content.trim().is_empty() {
        return Err(AppError::BadRequest("Content must not be empty".to_string()));
    }
    Ok(())
}

/// HTML 엔티티를 디코딩합니다. 모르는 이름은 그대로 둡니다.
pub fn decode_entities(input: &str) -> String {
    ENTITY_REGEX
        .replace_all(input, |caps: &Captures| {
            let body = &caps[1];
            let decoded = if let Some(hex) = body.strip_prefix("#x").or(body.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = body.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                named_entity(body)
            };
            match decoded {
                Some(ch) => ch.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn named_entity(name: &str) -> Option<char> {
    let ch = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "ndash" => '\u{2013}',
        "mdash" => '\u{2014}',
        "hellip" => '\u{2026}',
        "lsquo" => '\u{2018}',
        "rsquo" => '\u{2019}',
        "ldquo" => '\u{201c}',
        "rdquo" => '\u{201d}',
        "copy" => '\u{a9}',
        "reg" => '\u{ae}',
        _ => return None,
    };
    Some(ch)
}

/// 비교 전용 정규화
///
/// 1. 엔티티 디코딩
/// 2. 줄바꿈 통일 (\r\n, \r → \n) 후 앞뒤 공백 제거
/// 3. 태그 주변 공백 제거, 연속 공백/탭을 하나로
/// 4. 보이지 않는 문자(zero-width, BOM) 제거
/// 5. void 요소 표기 통일 (`<br />` → `<br>`)
pub fn normalize_for_comparison(content: &str) -> String {
    let decoded = decode_entities(content);
    let unified = decoded.replace("\r\n", "\n").replace('\r', "\n");
    let trimmed = unified.trim();
    let tight = TAG_WHITESPACE_REGEX.replace_all(trimmed, "$1");
    let collapsed = INLINE_SPACE_REGEX.replace_all(&tight, " ");
    let visible = INVISIBLE_REGEX.replace_all(&collapsed, "");
    VOID_TAG_REGEX
        .replace_all(&visible, |caps: &Captures| {
            let name = caps[1].to_ascii_lowercase();
            let attrs = caps.get(2).map(|m| m.as_str().trim_end()).unwrap_or("");
            format!("<{}{}>", name, attrs)
        })
        .into_owned()
}

/// 편집기가 보낸 블록 콘텐츠를 복원합니다.
///
/// JSON 문자열 리터럴, `\uXXXX` 이스케이프, 백슬래시 없는 마크업 이스케이프,
/// HTML 엔티티 순서로 풀어냅니다.
pub fn decode_block_content(content: &str) -> String {
    let mut decoded = match serde_json::from_str::<String>(content) {
        Ok(inner) => inner,
        Err(_) => content.to_string(),
    };

    if UNICODE_ESCAPE_REGEX.is_match(&decoded) {
        decoded = UNICODE_ESCAPE_REGEX
            .replace_all(&decoded, |caps: &Captures| {
                u32::from_str_radix(&caps[1], 16)
                    .ok()
                    .and_then(char::from_u32)
                    .map(|ch| ch.to_string())
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned();
    }

    if BARE_MARKUP_ESCAPE_REGEX.is_match(&decoded) {
        decoded = BARE_MARKUP_ESCAPE_REGEX
            .replace_all(&decoded, |caps: &Captures| {
                match caps[1].to_ascii_lowercase().as_str() {
                    "3c" => "<",
                    "3e" => ">",
                    "26" => "&",
                    "22" => "\"",
                    _ => "'",
                }
                .to_string()
            })
            .into_owned();
    }

    decode_entities(&decoded)
}

/// 정규화된 콘텐츠의 SHA-256 (16진수)
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_for_comparison(content).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// 리치 텍스트를 허용된 HTML 부분집합으로 정리하는 협력자
pub trait Sanitizer: Send + Sync {
    fn sanitize(&self, html: &str) -> String;
}

/// 기본 구현: script/style 요소, 인라인 이벤트 핸들러, javascript: URL 제거
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicSanitizer;

impl Sanitizer for BasicSanitizer {
    fn sanitize(&self, html: &str) -> String {
        let without_scripts = SCRIPT_STYLE_REGEX.replace_all(html, "");
        let without_handlers = EVENT_HANDLER_REGEX.replace_all(&without_scripts, "");
        JS_URL_REGEX
            .replace_all(&without_handlers, "$1=\"#\"")
            .into_owned()
    }
}
