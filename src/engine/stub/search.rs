//! Working with the search list.

use crate::conf::{check_domain, ResolvConf};
use crate::flags::InitFlags;


//------------ candidates ----------------------------------------------------

/// Returns the names to query in order for a host name.
///
/// Names ending in a dot are absolute and are only queried as they are.
/// Otherwise, the suffixes of the search list are appended in turn. If the
/// name has at least `ndots` dots, it is first tried as is before the
/// search list, else it is tried last. Names that become too long with a
/// suffix appended are skipped.
pub fn candidates(name: &str, conf: &ResolvConf) -> Vec<String> {
    if let Some(name) = name.strip_suffix('.') {
        return vec![name.into()];
    }
    if conf.flags.contains(InitFlags::NOSEARCH) || conf.search.is_empty() {
        return vec![name.into()];
    }

    let searched = conf
        .search
        .iter()
        .map(|suffix| {
            if suffix.is_empty() {
                name.to_string()
            } else {
                format!("{}.{}", name, suffix)
            }
        })
        .filter(|name| check_domain(name));
    let mut res = Vec::with_capacity(conf.search.len() + 1);
    if ndots(name) >= conf.ndots {
        res.push(name.to_string());
        res.extend(searched);
    } else {
        res.extend(searched);
        res.push(name.to_string());
    }
    res.dedup();
    res
}

/// Returns the number of dots in a name.
fn ndots(name: &str) -> usize {
    name.bytes().filter(|&ch| ch == b'.').count()
}


//============ Testing =======================================================
