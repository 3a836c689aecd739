// getifaddrs(3) walker: one link-layer (AF_LINK) record per interface carries a
// struct if_data with the counters we need.

use super::{CounterSet, DeviceStats, NetDevError, StatsSource};
use std::ffi::CStr;
use std::ptr;

const ORIGIN: &str = "getifaddrs()";

/// Enumerates interfaces with getifaddrs(3) on every call.
pub struct IfAddrsSource;

impl StatsSource for IfAddrsSource {
    fn collect(&self) -> Result<DeviceStats, NetDevError> {
        let list = IfAddrs::fetch_with(|head| unsafe { libc::getifaddrs(head) })?;
        // SAFETY: the list came from getifaddrs and stays alive until `list` drops.
        Ok(unsafe { walk(list.head) })
    }

    fn origin(&self) -> &str {
        ORIGIN
    }
}

/// Owns the list returned by getifaddrs; freed on drop.
struct IfAddrs {
    head: *mut libc::ifaddrs,
}

impl IfAddrs {
    fn fetch_with(
        primitive: impl FnOnce(*mut *mut libc::ifaddrs) -> libc::c_int,
    ) -> Result<Self, NetDevError> {
        let mut head: *mut libc::ifaddrs = ptr::null_mut();
        if primitive(&mut head) == -1 {
            return Err(NetDevError::SourceUnavailable {
                origin: ORIGIN.to_string(),
                source: std::io::Error::last_os_error(),
            });
        }
        Ok(Self { head })
    }
}

impl Drop for IfAddrs {
    fn drop(&mut self) {
        if !self.head.is_null() {
            // SAFETY: head came from a successful getifaddrs and only this drop frees it.
            unsafe { libc::freeifaddrs(self.head) };
        }
    }
}

/// Counters copied out of one `struct if_data`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct LinkCounters {
    ipackets: u64,
    opackets: u64,
    ierrors: u64,
    oerrors: u64,
    ibytes: u64,
    obytes: u64,
    imcasts: u64,
    omcasts: u64,
    iqdrops: u64,
    oqdrops: u64,
}

impl LinkCounters {
    fn into_counter_set(self) -> CounterSet {
        [
            ("receive_packets", self.ipackets),
            ("transmit_packets", self.opackets),
            ("receive_errs", self.ierrors),
            ("transmit_errs", self.oerrors),
            ("receive_bytes", self.ibytes),
            ("transmit_bytes", self.obytes),
            ("receive_multicast", self.imcasts),
            ("transmit_multicast", self.omcasts),
            ("receive_drop", self.iqdrops),
            ("transmit_drop", self.oqdrops),
        ]
        .into_iter()
        .map(|(name, v)| (name.to_string(), v.to_string()))
        .collect()
    }
}

/// Collect counters for every link-layer record; later records for the same name win.
///
/// # Safety
/// `head` is null or the first node of a well-formed ifaddrs list that outlives the call.
unsafe fn walk(head: *const libc::ifaddrs) -> DeviceStats {
    let mut net_dev = DeviceStats::new();
    let mut cursor = head;
    while let Some(ifa) = unsafe { cursor.as_ref() } {
        if !ifa.ifa_name.is_null()
            && let Some(counters) = unsafe { link_counters(ifa) }
        {
            let name = unsafe { CStr::from_ptr(ifa.ifa_name) }
                .to_string_lossy()
                .into_owned();
            net_dev.insert(name, counters.into_counter_set());
        }
        cursor = ifa.ifa_next;
    }
    net_dev
}

/// Read the `if_data` attached to an AF_LINK record. Returns `None` for any other
/// address family. The result is a copy; nothing points into `ifa` afterwards.
///
/// # Safety
/// `ifa.ifa_addr` is null or points to a valid sockaddr. When its family is AF_LINK,
/// `ifa.ifa_data` is null or points to a `struct if_data`.
unsafe fn link_counters(ifa: &libc::ifaddrs) -> Option<LinkCounters> {
    let addr = unsafe { ifa.ifa_addr.as_ref() }?;
    if libc::c_int::from(addr.sa_family) != libc::AF_LINK || ifa.ifa_data.is_null() {
        return None;
    }
    let data = unsafe { ifa.ifa_data.cast::<libc::if_data>().read_unaligned() };

    Some(LinkCounters {
        ipackets: u64::from(data.ifi_ipackets),
        opackets: u64::from(data.ifi_opackets),
        ierrors: u64::from(data.ifi_ierrors),
        oerrors: u64::from(data.ifi_oerrors),
        ibytes: u64::from(data.ifi_ibytes),
        obytes: u64::from(data.ifi_obytes),
        imcasts: u64::from(data.ifi_imcasts),
        omcasts: u64::from(data.ifi_omcasts),
        iqdrops: u64::from(data.ifi_iqdrops),
        oqdrops: output_queue_drops(&data),
    })
}

#[cfg(target_os = "freebsd")]
fn output_queue_drops(data: &libc::if_data) -> u64 {
    data.ifi_oqdrops
}

// Darwin's if_data has no output queue drop counter.
#[cfg(target_os = "macos")]
fn output_queue_drops(_data: &libc::if_data) -> u64 {
    0
}
