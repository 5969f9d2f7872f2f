//! Hidden Win32 window receiving session-end notifications.
//!
//! This is a real top-level window that is never shown: message-only
//! windows do not receive the `WM_QUERYENDSESSION` broadcast, so the shape
//! of the original helper is kept.

use std::ffi::OsStr;
use std::os::windows::ffi::OsStrExt as _;
use std::ptr;

use eyre::{Result, eyre};
use tracing::info;
use winapi::shared::minwindef::{FALSE, LPARAM, LRESULT, TRUE, UINT, WPARAM};
use winapi::shared::windef::HWND;
use winapi::um::libloaderapi::GetModuleHandleW;
use winapi::um::winbase::SetProcessShutdownParameters;
use winapi::um::winuser::{
    CreateWindowExW, DefWindowProcW, DispatchMessageW, GWLP_USERDATA, GetMessageW,
    GetWindowLongPtrW, MB_ICONINFORMATION, MB_OK, MB_SYSTEMMODAL, MSG, MessageBoxW, PostMessageW,
    PostQuitMessage, RegisterClassExW, SetWindowLongPtrW, ShutdownBlockReasonCreate,
    ShutdownBlockReasonDestroy, TranslateMessage, WM_APP, WM_CLOSE, WM_DESTROY,
    WM_QUERYENDSESSION, WNDCLASSEXW, WS_EX_TOPMOST,
};

use crate::cli::ServiceOptions;
use crate::sequence;
use crate::session::{EndSessionAction, SessionWatcher};

const WINDOW_CLASS: &str = "gracedown_watcher";

/// Posted after an allowed notify-mode query; handled on a later message
/// loop iteration so the notice never stalls the query response.
const WM_NOTICE: UINT = WM_APP;

const NOTICE_TEXT: &str = "The system is shutting down.\n\
    The database container and virtual machine were not stopped by this helper.";

/// State reachable from the window procedure via `GWLP_USERDATA`.
struct WindowState {
    watcher: SessionWatcher,
    options: ServiceOptions,
    block_reason: Vec<u16>,
}

/// Window handle wrapper the worker thread may post to.
///
/// HWNDs are plain identifiers and `PostMessageW` is documented as safe to
/// call from any thread; posting to an already destroyed window fails
/// harmlessly.
struct PostTarget(HWND);

// SAFETY: see type docs; no thread-affine state is carried.
unsafe impl Send for PostTarget {}

fn wide(text: &str) -> Vec<u16> {
    OsStr::new(text).encode_wide().chain(Some(0)).collect()
}

/// Creates the hidden watcher window and pumps messages until quit.
///
/// Blocks the calling thread for the lifetime of the service. Returns once
/// the window is destroyed, normally after a handled session end.
///
/// # Errors
///
/// Returns an error if the window class or window cannot be created.
pub fn run_watcher(options: &ServiceOptions) -> Result<()> {
    let class_name = wide(WINDOW_CLASS);
    let title = wide("gracedown session watcher");

    // SAFETY: null asks for the handle of the current module.
    let instance = unsafe { GetModuleHandleW(ptr::null()) };

    let class = WNDCLASSEXW {
        cbSize: u32::try_from(size_of::<WNDCLASSEXW>()).expect("struct size fits u32"),
        style: 0,
        lpfnWndProc: Some(wnd_proc),
        cbClsExtra: 0,
        cbWndExtra: 0,
        hInstance: instance,
        hIcon: ptr::null_mut(),
        hCursor: ptr::null_mut(),
        hbrBackground: ptr::null_mut(),
        lpszMenuName: ptr::null(),
        lpszClassName: class_name.as_ptr(),
        hIconSm: ptr::null_mut(),
    };
    // SAFETY: `class` describes a valid window class backed by `wnd_proc`;
    // the strings it points to outlive the registration.
    if unsafe { RegisterClassExW(&class) } == 0 {
        return Err(eyre!(
            "failed to register watcher window class: {}",
            std::io::Error::last_os_error()
        ));
    }

    // SAFETY: creates a zero-sized top-level window with no parent or menu;
    // all pointers are either null or valid NUL-terminated UTF-16 strings.
    let hwnd = unsafe {
        CreateWindowExW(
            WS_EX_TOPMOST,
            class_name.as_ptr(),
            title.as_ptr(),
            0,
            0,
            0,
            0,
            0,
            ptr::null_mut(),
            ptr::null_mut(),
            instance,
            ptr::null_mut(),
        )
    };
    if hwnd.is_null() {
        return Err(eyre!(
            "failed to create watcher window: {}",
            std::io::Error::last_os_error()
        ));
    }

    let state = Box::new(WindowState {
        watcher: SessionWatcher::new(options.mode),
        options: options.clone(),
        block_reason: wide(&options.block_reason),
    });
    let state_ptr = Box::into_raw(state);
    // SAFETY: `hwnd` is live; the pointer stays valid until reclaimed below.
    unsafe { SetWindowLongPtrW(hwnd, GWLP_USERDATA, state_ptr as isize) };

    // Ask for the earliest shutdown notification slot available to
    // applications (0x3FF), so the pipeline gets its head start.
    // SAFETY: plain parameter call without pointers.
    unsafe { SetProcessShutdownParameters(0x3FF, 0) };

    info!("watching for session end notifications");

    // SAFETY: MSG is plain old data; GetMessageW fills it in.
    let mut message: MSG = unsafe { std::mem::zeroed() };
    // SAFETY: `message` points at writable storage; a null window filter
    // pumps the whole thread queue.
    while unsafe { GetMessageW(&mut message, ptr::null_mut(), 0, 0) } > 0 {
        // SAFETY: `message` was filled in by GetMessageW.
        unsafe {
            TranslateMessage(&message);
            DispatchMessageW(&message);
        }
    }

    // SAFETY: the message loop has ended and the window procedure can no
    // longer run, so the state can be reclaimed exactly once.
    drop(unsafe { Box::from_raw(state_ptr) });

    Ok(())
}

unsafe extern "system" fn wnd_proc(
    hwnd: HWND,
    message: UINT,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    // SAFETY: `hwnd` is a live window while its procedure runs.
    let state_ptr = unsafe { GetWindowLongPtrW(hwnd, GWLP_USERDATA) } as *mut WindowState;
    // SAFETY: null until `run_watcher` stores the box, then valid until the
    // message loop ends; the procedure runs only on the loop's thread.
    let Some(state) = (unsafe { state_ptr.as_mut() }) else {
        // Creation-time messages arrive before the state is attached.
        return unsafe { DefWindowProcW(hwnd, message, wparam, lparam) };
    };

    match message {
        WM_QUERYENDSESSION => match state.watcher.on_end_session_query() {
            EndSessionAction::BlockAndRunSequence => {
                info!("session ending; blocking shutdown while the pipeline runs");
                // SAFETY: `hwnd` is live and the reason is NUL-terminated UTF-16.
                unsafe { ShutdownBlockReasonCreate(hwnd, state.block_reason.as_ptr()) };
                let target = PostTarget(hwnd);
                drop(sequence::spawn_worker(state.options.clone(), move || {
                    // SAFETY: posting to a window of this process; fails
                    // harmlessly if it is already gone.
                    unsafe { PostMessageW(target.0, WM_CLOSE, 0, 0) };
                }));
                FALSE as LRESULT
            }
            EndSessionAction::NoticeAndAllow => {
                info!("session ending; allowing shutdown, notice to follow");
                // SAFETY: posting to a live window of this thread.
                unsafe { PostMessageW(hwnd, WM_NOTICE, 0, 0) };
                TRUE as LRESULT
            }
            EndSessionAction::Ignore => {
                if state.watcher.block_active() {
                    FALSE as LRESULT
                } else {
                    TRUE as LRESULT
                }
            }
        },
        WM_NOTICE => {
            if state.watcher.take_pending_notice() {
                show_notice(hwnd);
            }
            0
        }
        WM_DESTROY => {
            if state.watcher.on_destroy() {
                // SAFETY: `hwnd` is still valid inside WM_DESTROY.
                unsafe { ShutdownBlockReasonDestroy(hwnd) };
            }
            // SAFETY: posts to the current thread's queue.
            unsafe { PostQuitMessage(0) };
            0
        }
        _ => unsafe { DefWindowProcW(hwnd, message, wparam, lparam) },
    }
}

fn show_notice(hwnd: HWND) {
    let text = wide(NOTICE_TEXT);
    let caption = wide("gracedown");
    // SAFETY: both strings are NUL-terminated UTF-16 outliving the call.
    unsafe {
        MessageBoxW(
            hwnd,
            text.as_ptr(),
            caption.as_ptr(),
            MB_OK | MB_ICONINFORMATION | MB_SYSTEMMODAL,
        )
    };
}
