//! FFI bindings for Proctor
//!
//! This module provides C-compatible functions for driving a session processor from
//! other languages. All functions use C strings (null-terminated) and return
//! allocated memory that must be freed by the caller using `proctor_free_string`.
//! Timestamps cross the boundary as Unix epoch milliseconds.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::MonitorConfig;
use crate::error::MonitorError;
use crate::pipeline::{replay_to_report, MonitorProcessor};
use crate::types::{AudioSnapshot, DetectionSnapshot};

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// A NULL config pointer selects the defaults
unsafe fn config_from_ptr(config_json: *const c_char) -> Result<MonitorConfig, MonitorError> {
    if config_json.is_null() {
        return Ok(MonitorConfig::default());
    }
    match cstr_to_string(config_json) {
        Some(json) => MonitorConfig::from_json(&json),
        None => Err(MonitorError::ParseError(
            "Config is not valid UTF-8".to_string(),
        )),
    }
}

fn timestamp_from_millis(ms: i64) -> Result<DateTime<Utc>, MonitorError> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| MonitorError::ParseError(format!("Timestamp out of range: {ms}")))
}

/// Serialize a result into a C string, or record the error and return NULL
fn respond<T: Serialize>(result: Result<T, MonitorError>) -> *mut c_char {
    match result.and_then(|value| serde_json::to_string(&value).map_err(MonitorError::from)) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Stateless API
// ============================================================================

/// Replay an NDJSON transcript and return the report JSON.
///
/// # Safety
/// - `transcript` must be a valid null-terminated C string.
/// - `config_json` must be a valid null-terminated C string or NULL for defaults.
/// - Returns a newly allocated string that must be freed with `proctor_free_string`.
/// - Returns NULL on error; call `proctor_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn proctor_replay_to_report(
    transcript: *const c_char,
    config_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let transcript = match cstr_to_string(transcript) {
        Some(s) => s,
        None => {
            set_last_error("Invalid transcript string pointer");
            return ptr::null_mut();
        }
    };

    respond(config_from_ptr(config_json).and_then(|config| replay_to_report(&transcript, &config)))
}

// ============================================================================
// Stateful Processor API
// ============================================================================

/// Opaque handle to a MonitorProcessor
pub struct ProctorProcessorHandle {
    processor: MonitorProcessor,
}

/// Start a session for `candidate_name` at `start_ms`.
///
/// # Safety
/// - `candidate_name` must be a valid null-terminated C string.
/// - `config_json` must be a valid null-terminated C string or NULL for defaults.
/// - Returns a pointer that must be freed with `proctor_processor_free`.
/// - Returns NULL on error; call `proctor_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn proctor_processor_new(
    candidate_name: *const c_char,
    config_json: *const c_char,
    start_ms: i64,
) -> *mut ProctorProcessorHandle {
    clear_last_error();

    let name = match cstr_to_string(candidate_name) {
        Some(s) => s,
        None => {
            set_last_error("Invalid candidate name string pointer");
            return ptr::null_mut();
        }
    };

    let started = config_from_ptr(config_json).and_then(|config| {
        let now = timestamp_from_millis(start_ms)?;
        MonitorProcessor::start(&name, &config, now)
    });

    match started {
        Ok(processor) => Box::into_raw(Box::new(ProctorProcessorHandle { processor })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a processor.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `proctor_processor_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn proctor_processor_free(processor: *mut ProctorProcessorHandle) {
    if !processor.is_null() {
        drop(Box::from_raw(processor));
    }
}

/// Process one detection snapshot; returns the tick outcome (`events`, `alerts`) as JSON.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `proctor_processor_new`.
/// - `snapshot_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `proctor_free_string`.
/// - Returns NULL on error; call `proctor_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn proctor_processor_process_detection(
    processor: *mut ProctorProcessorHandle,
    snapshot_json: *const c_char,
    timestamp_ms: i64,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }
    let handle = &mut *processor;

    let json = match cstr_to_string(snapshot_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid snapshot string pointer");
            return ptr::null_mut();
        }
    };

    let outcome = serde_json::from_str::<DetectionSnapshot>(&json)
        .map_err(MonitorError::from)
        .and_then(|snapshot| {
            timestamp_from_millis(timestamp_ms)
                .map(|now| handle.processor.process_detection(&snapshot, now))
        });
    respond(outcome)
}

/// Process one audio window; returns the raised alerts as a JSON array.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `proctor_processor_new`.
/// - `audio_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `proctor_free_string`.
/// - Returns NULL on error; call `proctor_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn proctor_processor_process_audio(
    processor: *mut ProctorProcessorHandle,
    audio_json: *const c_char,
    timestamp_ms: i64,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }
    let handle = &mut *processor;

    let json = match cstr_to_string(audio_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid audio string pointer");
            return ptr::null_mut();
        }
    };

    let alerts = serde_json::from_str::<AudioSnapshot>(&json)
        .map_err(MonitorError::from)
        .and_then(|audio| {
            timestamp_from_millis(timestamp_ms).map(|now| handle.processor.process_audio(&audio, now))
        });
    respond(alerts)
}

/// Report for the session as of `now_ms`.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `proctor_processor_new`.
/// - Returns a newly allocated string that must be freed with `proctor_free_string`.
/// - Returns NULL on error; call `proctor_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn proctor_processor_report(
    processor: *mut ProctorProcessorHandle,
    now_ms: i64,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }
    let handle = &*processor;

    respond(timestamp_from_millis(now_ms).map(|now| handle.processor.report(now)))
}

/// Empty the event log.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `proctor_processor_new`.
/// - Returns 0 on success, non-zero on error.
#[no_mangle]
pub unsafe extern "C" fn proctor_processor_clear_log(processor: *mut ProctorProcessorHandle) -> i32 {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return -1;
    }
    (*processor).processor.clear_log();
    0
}

/// Complete the session at `end_ms`.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `proctor_processor_new`.
/// - Returns 0 on success, non-zero on error.
/// - On error, call `proctor_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn proctor_processor_end(
    processor: *mut ProctorProcessorHandle,
    end_ms: i64,
) -> i32 {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return -1;
    }
    let handle = &mut *processor;

    match timestamp_from_millis(end_ms).and_then(|now| handle.processor.end(now)) {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by Proctor functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a Proctor function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn proctor_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - The returned pointer is valid until the next Proctor call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn proctor_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the Proctor library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn proctor_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;

    const START_MS: i64 = 1_705_327_200_000; // 2024-01-15T14:00:00Z

    unsafe fn take_string(ptr: *mut c_char) -> String {
        assert!(!ptr.is_null());
        let s = CStr::from_ptr(ptr).to_str().unwrap().to_string();
        proctor_free_string(ptr);
        s
    }

    #[test]
    fn test_ffi_processor_lifecycle() {
        let name = CString::new("Ada").unwrap();
        let phone = CString::new(
            r#"{"face_detected":true,"face_count":1,"focus_score":90,"confidence":0.9,"objects_detected":["cell phone"]}"#,
        )
        .unwrap();

        unsafe {
            let processor = proctor_processor_new(name.as_ptr(), ptr::null(), START_MS);
            assert!(!processor.is_null());

            let outcome = take_string(proctor_processor_process_detection(
                processor,
                phone.as_ptr(),
                START_MS + 1_000,
            ));
            let outcome: serde_json::Value = serde_json::from_str(&outcome).unwrap();
            assert_eq!(outcome["events"][0]["type"], "phone_detected");
            assert_eq!(outcome["alerts"][0]["severity"], "high");

            assert_eq!(proctor_processor_end(processor, START_MS + 600_000), 0);
            let report = take_string(proctor_processor_report(processor, START_MS + 600_000));
            let report: serde_json::Value = serde_json::from_str(&report).unwrap();
            assert_eq!(report["integrity_score"], 90);
            assert_eq!(report["status"], "completed");
            assert_eq!(report["duration"], 10);

            assert_eq!(proctor_processor_clear_log(processor), 0);
            let report = take_string(proctor_processor_report(processor, START_MS + 600_000));
            assert!(report.contains("\"integrity_score\":100"));

            proctor_processor_free(processor);
        }
    }

    #[test]
    fn test_ffi_audio_returns_alerts() {
        let name = CString::new("Ada").unwrap();
        let audio = CString::new(r#"{"is_speaking":true,"volume":42}"#).unwrap();

        unsafe {
            let processor = proctor_processor_new(name.as_ptr(), ptr::null(), START_MS);
            let alerts = take_string(proctor_processor_process_audio(
                processor,
                audio.as_ptr(),
                START_MS + 50,
            ));
            let alerts: serde_json::Value = serde_json::from_str(&alerts).unwrap();
            assert_eq!(alerts[0]["type"], "speech");
            proctor_processor_free(processor);
        }
    }

    #[test]
    fn test_ffi_replay_to_report() {
        let transcript = CString::new(
            r#"{"kind":"start","timestamp":"2024-01-15T14:00:00Z","candidate_name":"Ada"}
{"kind":"detection","timestamp":"2024-01-15T14:00:01Z","snapshot":{"face_detected":true,"face_count":2,"focus_score":80,"confidence":0.9}}
{"kind":"end","timestamp":"2024-01-15T14:05:00Z"}"#,
        )
        .unwrap();

        unsafe {
            let report = take_string(proctor_replay_to_report(transcript.as_ptr(), ptr::null()));
            let report: serde_json::Value = serde_json::from_str(&report).unwrap();
            assert_eq!(report["events_by_type"]["multiple_faces"], 1);
            assert_eq!(report["integrity_score"], 90);
        }
    }

    #[test]
    fn test_ffi_error_handling() {
        let blank = CString::new("  ").unwrap();
        let bad_config = CString::new(r#"{"focus_loss_threshold_secs":-1}"#).unwrap();
        let name = CString::new("Ada").unwrap();

        unsafe {
            assert!(proctor_processor_new(blank.as_ptr(), ptr::null(), START_MS).is_null());
            let error = CStr::from_ptr(proctor_last_error()).to_str().unwrap();
            assert!(error.contains("candidate"));

            assert!(proctor_processor_new(name.as_ptr(), bad_config.as_ptr(), START_MS).is_null());
            assert!(!proctor_last_error().is_null());

            let garbage = CString::new("not json").unwrap();
            assert!(proctor_replay_to_report(garbage.as_ptr(), ptr::null()).is_null());
            assert!(proctor_processor_report(ptr::null_mut(), START_MS).is_null());
        }
    }

    #[test]
    fn test_ffi_version() {
        unsafe {
            let version = proctor_version();
            assert!(!version.is_null());
            let version_str = CStr::from_ptr(version).to_str().unwrap();
            assert_eq!(version_str, crate::PROCTOR_VERSION);
        }
    }
}
