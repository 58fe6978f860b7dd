//! FFI bindings for kinesync
//!
//! This module provides C-compatible functions for driving the coordinator from
//! animation runtimes written in other languages. All functions use C strings
//! (null-terminated) and return allocated memory that must be freed by the caller
//! using `kinesync_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::config::{BehaviorTables, MotionSensitivity, SyncConfig};
use crate::coordinator::{synchronize_behaviors, BehaviorCoordinator};
use crate::cultural::CulturalDatabase;
use crate::request::{AdaptationUpdate, BehaviorRequest};
use crate::types::PlanId;

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Set the last error message
fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Clear the last error message
fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Map the C sensitivity level (0 = full, 1 = reduced, 2 = minimal)
fn sensitivity_from_level(level: i32) -> Option<MotionSensitivity> {
    match level {
        0 => Some(MotionSensitivity::Full),
        1 => Some(MotionSensitivity::Reduced),
        2 => Some(MotionSensitivity::Minimal),
        _ => None,
    }
}

/// Parse a plan id argument, recording the error on failure
unsafe fn plan_id_arg(ptr: *const c_char) -> Option<PlanId> {
    let Some(s) = cstr_to_string(ptr) else {
        set_last_error("Invalid plan id string pointer");
        return None;
    };
    match s.parse::<PlanId>() {
        Ok(id) => Some(id),
        Err(e) => {
            set_last_error(&format!("Invalid plan id '{s}': {e}"));
            None
        }
    }
}

// ============================================================================
// Stateless API
// ============================================================================

/// Synchronize a behavior request and return the plan JSON.
///
/// # Safety
/// - `request_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `kinesync_free_string`.
/// - Returns NULL on error; call `kinesync_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn kinesync_synchronize(request_json: *const c_char) -> *mut c_char {
    clear_last_error();

    let json_str = match cstr_to_string(request_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return ptr::null_mut();
        }
    };

    match synchronize_behaviors(&json_str) {
        Ok(plan) => string_to_cstr(&plan),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Stateful Coordinator API
// ============================================================================

/// Opaque handle to a BehaviorCoordinator
pub struct CoordinatorHandle {
    coordinator: BehaviorCoordinator,
}

/// Create a coordinator.
///
/// # Safety
/// - `config_json` must be a valid null-terminated C string, or NULL for the
///   default configuration.
/// - `motion_sensitivity`: 0 = full, 1 = reduced, 2 = minimal.
/// - Returns a pointer that must be freed with `kinesync_coordinator_free`.
/// - Returns NULL on error; call `kinesync_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn kinesync_coordinator_new(
    config_json: *const c_char,
    motion_sensitivity: i32,
) -> *mut CoordinatorHandle {
    clear_last_error();

    let config = if config_json.is_null() {
        SyncConfig::default()
    } else {
        let json_str = match cstr_to_string(config_json) {
            Some(s) => s,
            None => {
                set_last_error("Invalid config string pointer");
                return ptr::null_mut();
            }
        };
        match SyncConfig::from_json(&json_str) {
            Ok(config) => config,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        }
    };

    let Some(sensitivity) = sensitivity_from_level(motion_sensitivity) else {
        set_last_error(&format!("Invalid motion sensitivity level: {motion_sensitivity}"));
        return ptr::null_mut();
    };

    match BehaviorCoordinator::new(
        config,
        BehaviorTables::default(),
        CulturalDatabase::builtin(),
        sensitivity,
    ) {
        Ok(coordinator) => Box::into_raw(Box::new(CoordinatorHandle { coordinator })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a coordinator.
///
/// # Safety
/// - `coordinator` must be a valid pointer returned by `kinesync_coordinator_new`.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn kinesync_coordinator_free(coordinator: *mut CoordinatorHandle) {
    if !coordinator.is_null() {
        drop(Box::from_raw(coordinator));
    }
}

/// Plan a behavior request and register it as live.
///
/// # Safety
/// - `coordinator` must be a valid pointer returned by `kinesync_coordinator_new`.
/// - `request_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `kinesync_free_string`.
/// - Returns NULL on error; call `kinesync_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn kinesync_coordinator_plan(
    coordinator: *mut CoordinatorHandle,
    request_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if coordinator.is_null() {
        set_last_error("Null coordinator pointer");
        return ptr::null_mut();
    }

    let handle = &mut *coordinator;

    let json_str = match cstr_to_string(request_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return ptr::null_mut();
        }
    };

    let result = BehaviorRequest::from_json(&json_str)
        .and_then(|request| handle.coordinator.plan(&request))
        .and_then(|plan| plan.to_json());

    match result {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Advance the coordinator clock; returns a JSON array of evicted plan ids.
///
/// # Safety
/// - `coordinator` must be a valid pointer returned by `kinesync_coordinator_new`.
/// - Returns a newly allocated string that must be freed with `kinesync_free_string`.
/// - Returns NULL on error; call `kinesync_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn kinesync_coordinator_advance(
    coordinator: *mut CoordinatorHandle,
    delta_ms: f64,
) -> *mut c_char {
    clear_last_error();

    if coordinator.is_null() {
        set_last_error("Null coordinator pointer");
        return ptr::null_mut();
    }

    let handle = &mut *coordinator;
    let evicted = handle.coordinator.advance_time(delta_ms);

    match serde_json::to_string(&evicted) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Adapt a live plan; returns the adapted plan JSON.
///
/// # Safety
/// - `coordinator` must be a valid pointer returned by `kinesync_coordinator_new`.
/// - `plan_id` and `update_json` must be valid null-terminated C strings.
/// - Returns a newly allocated string that must be freed with `kinesync_free_string`.
/// - Returns NULL on error; call `kinesync_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn kinesync_coordinator_adapt(
    coordinator: *mut CoordinatorHandle,
    plan_id: *const c_char,
    update_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if coordinator.is_null() {
        set_last_error("Null coordinator pointer");
        return ptr::null_mut();
    }

    let handle = &mut *coordinator;

    let Some(id) = plan_id_arg(plan_id) else {
        return ptr::null_mut();
    };

    let json_str = match cstr_to_string(update_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return ptr::null_mut();
        }
    };

    let result = AdaptationUpdate::from_json(&json_str)
        .and_then(|update| handle.coordinator.adapt_live_plan(id, &update))
        .and_then(|plan| plan.to_json());

    match result {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Get a live plan as JSON.
///
/// # Safety
/// - `coordinator` must be a valid pointer returned by `kinesync_coordinator_new`.
/// - `plan_id` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `kinesync_free_string`.
/// - Returns NULL if the plan is not live; call `kinesync_last_error` for details.
#[no_mangle]
pub unsafe extern "C" fn kinesync_coordinator_live_plan(
    coordinator: *const CoordinatorHandle,
    plan_id: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if coordinator.is_null() {
        set_last_error("Null coordinator pointer");
        return ptr::null_mut();
    }

    let handle = &*coordinator;

    let Some(id) = plan_id_arg(plan_id) else {
        return ptr::null_mut();
    };

    let Some(plan) = handle.coordinator.live_plan(id) else {
        set_last_error(&format!("Unknown plan: {id}"));
        return ptr::null_mut();
    };

    match plan.to_json() {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by kinesync functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a kinesync function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn kinesync_free_string(ptr: *mut c_char) {
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
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next kinesync function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn kinesync_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the kinesync library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn kinesync_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SynchronizedBehaviorPlan;
    use std::ffi::CString;

    fn sample_request_json() -> CString {
        CString::new(
            r#"{
            "text": "Let me walk you through the results",
            "speech_duration_ms": 2400,
            "speech_context": {"formality": "neutral"},
            "hand_gestures": [{"type": "descriptive", "start_time": 0, "end_time": 1200}],
            "facial_expressions": [{"type": "smile", "start_time": 0, "end_time": 1800}],
            "head_movements": [{"type": "nod", "start_time": 900, "end_time": 1400}]
        }"#,
        )
        .unwrap()
    }

    unsafe fn take_string(ptr: *mut c_char) -> String {
        assert!(!ptr.is_null());
        let s = CStr::from_ptr(ptr).to_str().unwrap().to_string();
        kinesync_free_string(ptr);
        s
    }

    #[test]
    fn test_ffi_synchronize() {
        let json = sample_request_json();

        unsafe {
            let result = take_string(kinesync_synchronize(json.as_ptr()));
            let plan = SynchronizedBehaviorPlan::from_json(&result).unwrap();
            assert_eq!(plan.event_count(), 3);
            assert_eq!(plan.version, 1);
        }
    }

    #[test]
    fn test_ffi_coordinator_lifecycle() {
        unsafe {
            let coordinator = kinesync_coordinator_new(ptr::null(), 0);
            assert!(!coordinator.is_null());

            let json = sample_request_json();
            let plan_json = take_string(kinesync_coordinator_plan(coordinator, json.as_ptr()));
            let plan = SynchronizedBehaviorPlan::from_json(&plan_json).unwrap();
            let id = CString::new(plan.id.to_string()).unwrap();

            let live = take_string(kinesync_coordinator_live_plan(coordinator, id.as_ptr()));
            assert!(live.contains(&plan.id.to_string()));

            let update = CString::new(r#"{"remove": ["nod"]}"#).unwrap();
            let adapted = take_string(kinesync_coordinator_adapt(
                coordinator,
                id.as_ptr(),
                update.as_ptr(),
            ));
            let adapted = SynchronizedBehaviorPlan::from_json(&adapted).unwrap();
            assert_eq!(adapted.version, 2);
            assert!(adapted.head_movements.is_empty());

            let evicted = take_string(kinesync_coordinator_advance(coordinator, 60_000.0));
            assert!(evicted.contains(&plan.id.to_string()));

            let missing = kinesync_coordinator_live_plan(coordinator, id.as_ptr());
            assert!(missing.is_null());
            assert!(!kinesync_last_error().is_null());

            kinesync_coordinator_free(coordinator);
        }
    }

    #[test]
    fn test_ffi_error_handling() {
        unsafe {
            let invalid_json = CString::new("not json").unwrap();
            let result = kinesync_synchronize(invalid_json.as_ptr());
            assert!(result.is_null());

            let error = kinesync_last_error();
            assert!(!error.is_null());
            let error_str = CStr::from_ptr(error).to_str().unwrap();
            assert!(!error_str.is_empty());

            assert!(kinesync_coordinator_new(ptr::null(), 7).is_null());

            let coordinator = kinesync_coordinator_new(ptr::null(), 1);
            let bad_id = CString::new("not-a-uuid").unwrap();
            let update = CString::new("{}").unwrap();
            assert!(kinesync_coordinator_adapt(coordinator, bad_id.as_ptr(), update.as_ptr()).is_null());
            let error_str = CStr::from_ptr(kinesync_last_error()).to_str().unwrap();
            assert!(error_str.contains("not-a-uuid"));
            kinesync_coordinator_free(coordinator);
        }
    }

    #[test]
    fn test_ffi_version() {
        unsafe {
            let version = kinesync_version();
            assert!(!version.is_null());

            let version_str = CStr::from_ptr(version).to_str().unwrap();
            assert!(!version_str.is_empty());
        }
    }
}
