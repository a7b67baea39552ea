//! C ABI
//!
//! Every handle is a heap-allocated Rust value passed to the host as an opaque
//! pointer: `ea_session_builder_t` is a [`SessionBuilder`], `ea_session_t` a
//! [`Session`] and `ea_tool_approval_t` a [`ToolApprovalGate`]. Functions that
//! consume a handle free it. See `include/embed_agent.h` for the host-facing
//! contract.

use std::ffi::{c_char, c_void, CStr};
use std::ptr;

use crate::approval::ToolApprovalGate;
use crate::callbacks::{SessionHandler, NO_APPROVAL_HANDLER};
use crate::conversation::TranscriptSource;
use crate::error::ErrorCode;
use crate::session::{Session, SessionBuilder};

/// Callbacks for events from a session.
///
/// The callback functions and `user_info` must be safe to call and use from a
/// thread other than the one that registered them. Calls for one session never
/// overlap.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct SessionCallbacks {
    /// Host data passed to every callback.
    pub user_info: *mut c_void,
    /// The session finished a turn and accepts messages again.
    pub on_idle: Option<unsafe extern "C" fn(*mut c_void)>,
    /// A transcript segment. The text is UTF-8, not NUL-terminated, and only
    /// valid for the duration of the call.
    pub on_transcript: Option<unsafe extern "C" fn(*mut c_void, *const c_char, usize, u32)>,
    /// A tool call awaiting approval. The host must pass the approval to
    /// exactly one of `ea_tool_approval_approve` / `ea_tool_approval_reject`.
    pub on_tool_call_request: Option<unsafe extern "C" fn(*mut c_void, *mut ToolApprovalGate)>,
    /// Frees `user_info`. Called once, after the last other callback.
    pub free: Option<unsafe extern "C" fn(*mut c_void)>,
}

// SAFETY: The host promises the callbacks and `user_info` are thread-safe.
unsafe impl Send for SessionCallbacks {}
// SAFETY: As above.
unsafe impl Sync for SessionCallbacks {}

/// Adapts a host callback table to [`SessionHandler`].
struct ForeignHandler {
    callbacks: SessionCallbacks,
    freed: bool,
}

impl SessionHandler for ForeignHandler {
    fn on_idle(&mut self) {
        if let Some(on_idle) = self.callbacks.on_idle {
            // SAFETY: Host-provided function pointer and data.
            unsafe { on_idle(self.callbacks.user_info) };
        }
    }

    fn on_transcript(&mut self, text: &str, source: TranscriptSource) {
        if let Some(on_transcript) = self.callbacks.on_transcript {
            // SAFETY: `text` outlives the call; the host must not keep it.
            unsafe {
                on_transcript(
                    self.callbacks.user_info,
                    text.as_ptr().cast::<c_char>(),
                    text.len(),
                    source as u32,
                );
            }
        }
    }

    fn on_tool_call_request(&mut self, gate: ToolApprovalGate) {
        let Some(on_request) = self.callbacks.on_tool_call_request else {
            gate.reject_with_reason(NO_APPROVAL_HANDLER);
            return;
        };
        let approval = Box::into_raw(Box::new(gate));
        // SAFETY: Ownership of `approval` passes to the host.
        unsafe { on_request(self.callbacks.user_info, approval) };
    }

    fn on_teardown(&mut self) {
        if self.freed {
            return;
        }
        self.freed = true;
        if let Some(free) = self.callbacks.free {
            // SAFETY: Called exactly once, after every other callback.
            unsafe { free(self.callbacks.user_info) };
        }
    }
}

impl Drop for ForeignHandler {
    fn drop(&mut self) {
        self.on_teardown();
    }
}

/// Borrow a C string as UTF-8, or `None` for null or malformed input.
///
/// # Safety
///
/// `s` must be null or point to a NUL-terminated string.
unsafe fn borrow_str<'a>(s: *const c_char) -> Option<&'a str> {
    if s.is_null() {
        return None;
    }
    // SAFETY: Non-null and NUL-terminated per the caller.
    unsafe { CStr::from_ptr(s) }.to_str().ok()
}

/// Install a stderr log subscriber. Optional; safe to call more than once.
#[no_mangle]
pub extern "C" fn ea_init_logging() {
    crate::telemetry::init_tracing();
}

/// Creates a session builder for an `OpenAI`-compatible provider.
///
/// On success `*out` receives the builder. The host must later pass it to
/// `ea_session_builder_build` or `ea_session_builder_free`.
///
/// # Safety
///
/// `out` must be a valid pointer to writable storage for a pointer. The
/// strings must be null or NUL-terminated.
#[no_mangle]
pub unsafe extern "C" fn ea_session_builder_new_openai(
    out: *mut *mut SessionBuilder,
    api_key: *const c_char,
    base_url: *const c_char,
    model: *const c_char,
) -> ErrorCode {
    if out.is_null() {
        return ErrorCode::Invalid;
    }
    // SAFETY: Forwarded from the caller's contract.
    let strings = unsafe { (borrow_str(api_key), borrow_str(base_url), borrow_str(model)) };
    let (Some(api_key), Some(base_url), Some(model)) = strings else {
        tracing::warn!("Rejecting builder: null or non-UTF-8 argument");
        return ErrorCode::Invalid;
    };

    match SessionBuilder::openai(api_key, base_url, model) {
        Ok(builder) => {
            // SAFETY: `out` is non-null and writable per the caller.
            unsafe { out.write(Box::into_raw(Box::new(builder))) };
            ErrorCode::Ok
        }
        Err(e) => {
            tracing::warn!(error = %e, "Rejecting builder");
            e.code()
        }
    }
}

/// Sets the callbacks for a builder, replacing any set earlier.
///
/// A replaced callback set has its `free` called immediately. The table is
/// copied; `callbacks` need not outlive the call.
///
/// # Safety
///
/// `builder` must be a live builder handle. `callbacks` must point to a valid
/// `SessionCallbacks` whose function pointers are null or valid.
#[no_mangle]
pub unsafe extern "C" fn ea_session_builder_set_callbacks(
    builder: *mut SessionBuilder,
    callbacks: *const SessionCallbacks,
) {
    if builder.is_null() || callbacks.is_null() {
        tracing::warn!("ea_session_builder_set_callbacks called with null pointer");
        return;
    }
    // SAFETY: Both pointers are valid per the caller.
    let (builder, callbacks) = unsafe { (&mut *builder, *callbacks) };
    builder.set_callbacks(ForeignHandler {
        callbacks,
        freed: false,
    });
}

/// Frees a builder that was not built. Its callbacks' `free` runs immediately.
///
/// # Safety
///
/// `builder` must be null or a live builder handle, and is invalid afterwards.
#[no_mangle]
pub unsafe extern "C" fn ea_session_builder_free(builder: *mut SessionBuilder) {
    if builder.is_null() {
        return;
    }
    // SAFETY: Live handle created by `Box::into_raw`.
    drop(unsafe { Box::from_raw(builder) });
}

/// Builds a session, consuming the builder.
///
/// Returns null if the session could not be started; the builder is consumed
/// either way.
///
/// # Safety
///
/// `builder` must be a live builder handle, and is invalid afterwards.
#[no_mangle]
pub unsafe extern "C" fn ea_session_builder_build(builder: *mut SessionBuilder) -> *mut Session {
    if builder.is_null() {
        return ptr::null_mut();
    }
    // SAFETY: Live handle created by `Box::into_raw`.
    let builder = unsafe { *Box::from_raw(builder) };
    match builder.build() {
        Ok(session) => Box::into_raw(Box::new(session)),
        Err(e) => {
            tracing::error!(error = %e, "Failed to build session");
            ptr::null_mut()
        }
    }
}

/// Sends a user message. Fails unless the session is idle.
///
/// # Safety
///
/// `session` must be a live session handle. `message` must be null or
/// NUL-terminated.
#[no_mangle]
pub unsafe extern "C" fn ea_session_send_message(
    session: *mut Session,
    message: *const c_char,
) -> ErrorCode {
    if session.is_null() {
        return ErrorCode::Invalid;
    }
    // SAFETY: Forwarded from the caller's contract.
    let Some(message) = (unsafe { borrow_str(message) }) else {
        return ErrorCode::Invalid;
    };
    // SAFETY: Live handle per the caller.
    let session = unsafe { &*session };
    ErrorCode::from(&session.send_message(message))
}

/// Releases a session. No callbacks other than `free` follow; `free` may run
/// on another thread after this returns.
///
/// # Safety
///
/// `session` must be null or a live session handle, and is invalid afterwards.
#[no_mangle]
pub unsafe extern "C" fn ea_session_free(session: *mut Session) {
    if session.is_null() {
        return;
    }
    // SAFETY: Live handle created by `Box::into_raw`.
    drop(unsafe { Box::from_raw(session) });
}

/// Approves a tool call, consuming the approval.
///
/// # Safety
///
/// `approval` must be an unconsumed handle received by `on_tool_call_request`.
#[no_mangle]
pub unsafe extern "C" fn ea_tool_approval_approve(approval: *mut ToolApprovalGate) {
    if approval.is_null() {
        return;
    }
    // SAFETY: Unconsumed handle created by `Box::into_raw`.
    unsafe { Box::from_raw(approval) }.approve();
}

/// Rejects a tool call, consuming the approval.
///
/// # Safety
///
/// `approval` must be an unconsumed handle received by `on_tool_call_request`.
#[no_mangle]
pub unsafe extern "C" fn ea_tool_approval_reject(approval: *mut ToolApprovalGate) {
    if approval.is_null() {
        return;
    }
    // SAFETY: Unconsumed handle created by `Box::into_raw`.
    unsafe { Box::from_raw(approval) }.reject();
}

/// What the tool is going to do.
///
/// The returned text is UTF-8, not NUL-terminated, `*out_len` bytes long and
/// valid until the approval is consumed.
///
/// # Safety
///
/// `approval` must be an unconsumed approval handle. `out_len` must be valid
/// for writes.
#[no_mangle]
pub unsafe extern "C" fn ea_tool_approval_get_description(
    approval: *const ToolApprovalGate,
    out_len: *mut usize,
) -> *const c_char {
    // SAFETY: Forwarded from the caller's contract.
    unsafe { borrowed_text(approval, out_len, ToolApprovalGate::description) }
}

/// Why the provider asked for the tool call.
///
/// Same lifetime rules as `ea_tool_approval_get_description`.
///
/// # Safety
///
/// `approval` must be an unconsumed approval handle. `out_len` must be valid
/// for writes.
#[no_mangle]
pub unsafe extern "C" fn ea_tool_approval_get_justification(
    approval: *const ToolApprovalGate,
    out_len: *mut usize,
) -> *const c_char {
    // SAFETY: Forwarded from the caller's contract.
    unsafe { borrowed_text(approval, out_len, ToolApprovalGate::justification) }
}

/// # Safety
///
/// Same as the gate accessors above.
unsafe fn borrowed_text(
    approval: *const ToolApprovalGate,
    out_len: *mut usize,
    field: fn(&ToolApprovalGate) -> &str,
) -> *const c_char {
    if approval.is_null() {
        if !out_len.is_null() {
            // SAFETY: Non-null and writable per the caller.
            unsafe { out_len.write(0) };
        }
        return ptr::null();
    }
    // SAFETY: Unconsumed handle per the caller.
    let text = field(unsafe { &*approval });
    if !out_len.is_null() {
        // SAFETY: Non-null and writable per the caller.
        unsafe { out_len.write(text.len()) };
    }
    text.as_ptr().cast::<c_char>()
}
