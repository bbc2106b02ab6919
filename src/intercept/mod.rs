//! Entry points the dynamic linker binds in place of the C library's.
//!
//! Preloading the `cdylib` makes the target resolve `getaddrinfo`,
//! `gethostbyname` and `getnameinfo` here first. Only `getaddrinfo` answers;
//! the other two refuse every call so nothing reaches the system resolver.
//! `freeaddrinfo` is left to the C library (see [`addrinfo`]).

pub mod addrinfo;

use std::ffi::{CStr, c_char, c_int};
use std::ptr;
use std::sync::OnceLock;

use log::{error, warn};

use crate::config::ResolverConfig;
use crate::dns::{DnsResolver, Resolver};
use crate::logging;
use addrinfo::Hints;

/// Exit status when the process has no resolver to redirect to.
pub const EXIT_NO_RESOLVER: i32 = 1;

static RESOLVER: OnceLock<Box<dyn Resolver>> = OnceLock::new();

/// Register the resolver used by every intercepted lookup.
///
/// Must happen before the first lookup; afterwards the registered resolver
/// is fixed and the rejected one is handed back.
pub fn install(resolver: Box<dyn Resolver>) -> Result<(), Box<dyn Resolver>> {
    RESOLVER.set(resolver)
}

/// The registered resolver, or one built from the environment on first use.
///
/// Without a usable `DNS` setting the process exits: falling back to the
/// system resolver would defeat the redirect.
fn resolver() -> &'static dyn Resolver {
    RESOLVER
        .get_or_init(|| -> Box<dyn Resolver> {
            match ResolverConfig::from_env() {
                Ok(config) => Box::new(DnsResolver::new(config)),
                Err(e) => {
                    error!("{e}, aborting");
                    std::process::exit(EXIT_NO_RESOLVER);
                }
            }
        })
        .as_ref()
}

unsafe fn opt_cstr<'a>(ptr: *const c_char) -> Option<&'a CStr> {
    if ptr.is_null() {
        return None;
    }
    // SAFETY: caller-provided C string pointer.
    Some(unsafe { CStr::from_ptr(ptr) })
}

/// `getaddrinfo(3)` answered by the registered [`Resolver`].
///
/// # Safety
/// Arguments must follow the C `getaddrinfo` contract.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn getaddrinfo(
    node: *const c_char,
    service: *const c_char,
    hints: *const libc::addrinfo,
    res: *mut *mut libc::addrinfo,
) -> c_int {
    logging::init();
    let resolver = resolver();

    if res.is_null() {
        return libc::EAI_FAIL;
    }
    // SAFETY: output pointer is non-null and writable by contract.
    unsafe { *res = ptr::null_mut() };

    // SAFETY: optional C strings per the getaddrinfo contract.
    let node = unsafe { opt_cstr(node) };
    // SAFETY: as above.
    let service = unsafe { opt_cstr(service) };
    // SAFETY: hints is either NULL or a caller-owned addrinfo.
    let hints = unsafe { hints.as_ref() }.map(Hints::from_addrinfo);

    match addrinfo::lookup(resolver, node, service, hints) {
        Ok(list) => {
            // SAFETY: checked non-null above.
            unsafe { *res = list.as_ptr() };
            0
        }
        Err(e) => e.code(),
    }
}

/// Legacy lookup, always refused.
///
/// # Safety
/// `name` must be NULL or a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn gethostbyname(name: *const c_char) -> *mut libc::hostent {
    logging::init();
    // SAFETY: NULL or NUL-terminated by contract.
    let name = unsafe { opt_cstr(name) };
    warn!("gethostbyname({name:?}) blocked");
    ptr::null_mut()
}

/// Reverse lookup, always refused.
///
/// # Safety
/// Never reads its arguments.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn getnameinfo(
    _sa: *const libc::sockaddr,
    _salen: libc::socklen_t,
    _host: *mut c_char,
    _hostlen: libc::socklen_t,
    _serv: *mut c_char,
    _servlen: libc::socklen_t,
    _flags: c_int,
) -> c_int {
    logging::init();
    warn!("getnameinfo() blocked");
    libc::EAI_FAIL
}
