use std::ffi::{CStr, c_char, c_int};
use std::mem::size_of;
use std::net::Ipv4Addr;
use std::ptr::{self, NonNull};
use std::sync::Mutex;

use log::{debug, warn};
use thiserror::Error;

use crate::dns::{ResolveError, Resolver};

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("no usable hostname")]
    NoName,
    #[error("address family {0} is not served, only AF_INET")]
    Family(c_int),
    #[error("resolution failed at {} stage: {0}", .0.stage())]
    Resolve(#[from] ResolveError),
    #[error("could not allocate the result")]
    Memory,
}

impl LookupError {
    /// The `EAI_*` value handed back through `getaddrinfo`.
    pub fn code(&self) -> c_int {
        match self {
            Self::NoName => libc::EAI_NONAME,
            Self::Family(_) => libc::EAI_FAMILY,
            Self::Resolve(_) => libc::EAI_FAIL,
            Self::Memory => libc::EAI_MEMORY,
        }
    }
}

/// The caller's hints, copied out of their `addrinfo`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Hints {
    pub flags: c_int,
    pub family: c_int,
    pub socktype: c_int,
    pub protocol: c_int,
}

impl Hints {
    pub fn from_addrinfo(hints: &libc::addrinfo) -> Self {
        Self {
            flags: hints.ai_flags,
            family: hints.ai_family,
            socktype: hints.ai_socktype,
            protocol: hints.ai_protocol,
        }
    }
}

/// One allocation for the node and its address. glibc's `freeaddrinfo`
/// frees `ai_canonname` and the node pointer, which releases both.
#[repr(C)]
struct AddrInfoBlock {
    info: libc::addrinfo,
    addr: libc::sockaddr_in,
}

/// Resolve `node` through `resolver` and build the single-entry result list.
///
/// `hints` is `None` when the caller passed a NULL hints pointer. The family
/// check runs before the resolver is consulted.
pub fn lookup(
    resolver: &dyn Resolver,
    node: Option<&CStr>,
    service: Option<&CStr>,
    hints: Option<Hints>,
) -> Result<NonNull<libc::addrinfo>, LookupError> {
    let request = hints.unwrap_or_default();
    if request.family != libc::AF_UNSPEC && request.family != libc::AF_INET {
        return Err(LookupError::Family(request.family));
    }

    let host = node
        .and_then(|n| n.to_str().ok())
        .ok_or(LookupError::NoName)?;

    let ip = match host.parse::<Ipv4Addr>() {
        Ok(literal) => literal,
        Err(_) if request.flags & libc::AI_NUMERICHOST != 0 => {
            return Err(LookupError::NoName);
        }
        Err(_) => resolver.resolve(host).inspect_err(|e| {
            warn!("lookup of {host} failed at {} stage: {e}", e.stage());
        })?,
    };

    let port = service_port(service, hints.map(|h| h.protocol));
    debug!("{host}:{port} resolved to {ip}");

    // SAFETY: the block is freshly allocated and fully initialised below.
    unsafe { alloc_result(ip, port, &request) }
}

/// Release a list built by [`lookup`].
///
/// # Safety
/// `res` must come from [`lookup`] and not have been freed already.
pub unsafe fn free_result(res: NonNull<libc::addrinfo>) {
    // SAFETY: the node is the start of one calloc'd block.
    unsafe { libc::free(res.as_ptr().cast()) };
}

unsafe fn alloc_result(
    ip: Ipv4Addr,
    port: u16,
    request: &Hints,
) -> Result<NonNull<libc::addrinfo>, LookupError> {
    // SAFETY: calloc with a non-zero size; the result is checked for NULL.
    let raw = unsafe { libc::calloc(1, size_of::<AddrInfoBlock>()) }.cast::<AddrInfoBlock>();
    let block = NonNull::new(raw).ok_or(LookupError::Memory)?;

    // SAFETY: `block` is valid, zeroed, aligned by calloc and owned here.
    unsafe {
        let block = block.as_ptr();
        let addr = ptr::addr_of_mut!((*block).addr);
        (*addr).sin_family = libc::AF_INET as libc::sa_family_t;
        (*addr).sin_port = port.to_be();
        (*addr).sin_addr = libc::in_addr {
            s_addr: u32::from(ip).to_be(),
        };

        let info = ptr::addr_of_mut!((*block).info);
        (*info).ai_family = libc::AF_INET;
        (*info).ai_socktype = request.socktype;
        (*info).ai_protocol = request.protocol;
        (*info).ai_addrlen = size_of::<libc::sockaddr_in>() as libc::socklen_t;
        (*info).ai_addr = addr.cast::<libc::sockaddr>();

        Ok(NonNull::new_unchecked(info))
    }
}

/// `getservbyname` returns static storage, so lookups go one at a time.
static SERVICES: Mutex<()> = Mutex::new(());

/// Port in host order for a service hint: a decimal number, or a name from
/// the services database. Anything else maps to 0.
fn service_port(service: Option<&CStr>, protocol: Option<c_int>) -> u16 {
    let Some(service) = service else {
        return 0;
    };
    if let Ok(port) = service.to_str().unwrap_or_default().trim().parse::<u16>() {
        return port;
    }

    let proto: *const c_char = match protocol {
        None => ptr::null(),
        Some(libc::IPPROTO_TCP) => c"tcp".as_ptr(),
        Some(_) => c"udp".as_ptr(),
    };

    let _guard = match SERVICES.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    // SAFETY: both strings are NUL-terminated; the entry is read while the
    // lock is held.
    let entry = unsafe { libc::getservbyname(service.as_ptr(), proto) };
    if entry.is_null() {
        debug!("unknown service {service:?}, using port 0");
        return 0;
    }
    // SAFETY: non-null entry from the services database.
    u16::from_be(unsafe { (*entry).s_port } as u16)
}
