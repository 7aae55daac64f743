use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Supported DNS record types.
///
/// The lowercase serialized name is the discriminant used as the map key in
/// a stored [`RecordSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    /// IPv4 address record
    A,
    /// IPv6 address record
    Aaaa,
    /// Canonical name record
    Cname,
    /// Text record
    Txt,
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::A => "A",
            Self::Aaaa => "AAAA",
            Self::Cname => "CNAME",
            Self::Txt => "TXT",
        })
    }
}

/// Type A record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ARecord {
    /// IPv4 address
    pub ip: Ipv4Addr,
    /// Time to live in seconds
    pub ttl: u32,
}

/// Type AAAA record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AaaaRecord {
    /// IPv6 address
    pub ip: Ipv6Addr,
    /// Time to live in seconds
    pub ttl: u32,
}

/// Type CNAME record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CnameRecord {
    /// Target host
    pub host: String,
    /// Time to live in seconds
    pub ttl: u32,
}

/// Type TXT record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxtRecord {
    /// Record text
    pub text: String,
    /// Time to live in seconds
    pub ttl: u32,
}

/// A single DNS record of any supported type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// A record
    A(ARecord),
    /// AAAA record
    Aaaa(AaaaRecord),
    /// CNAME record
    Cname(CnameRecord),
    /// TXT record
    Txt(TxtRecord),
}

impl Record {
    /// Build an address record for `ip`.
    ///
    /// IPv4 and IPv4-mapped IPv6 addresses give an `A` record, everything
    /// else an `AAAA` record.
    #[must_use]
    pub fn from_ip(ip: IpAddr, ttl: u32) -> Self {
        match ip {
            IpAddr::V4(ip) => Self::A(ARecord { ip, ttl }),
            IpAddr::V6(v6) => v6.to_ipv4_mapped().map_or_else(
                || Self::Aaaa(AaaaRecord { ip: v6, ttl }),
                |ip| Self::A(ARecord { ip, ttl }),
            ),
        }
    }

    /// The discriminant of this record
    #[must_use]
    pub const fn record_type(&self) -> RecordType {
        match self {
            Self::A(_) => RecordType::A,
            Self::Aaaa(_) => RecordType::Aaaa,
            Self::Cname(_) => RecordType::Cname,
            Self::Txt(_) => RecordType::Txt,
        }
    }

    /// Time to live in seconds
    #[must_use]
    pub const fn ttl(&self) -> u32 {
        match self {
            Self::A(r) => r.ttl,
            Self::Aaaa(r) => r.ttl,
            Self::Cname(r) => r.ttl,
            Self::Txt(r) => r.ttl,
        }
    }

    /// Returns true if both records publish the same data, whatever their TTL.
    ///
    /// This is record identity inside a [`RecordSet`]: the TTL is a property
    /// of the record, not part of what it names.
    #[must_use]
    pub fn same_data(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::A(a), Self::A(b)) => a.ip == b.ip,
            (Self::Aaaa(a), Self::Aaaa(b)) => a.ip == b.ip,
            (Self::Cname(a), Self::Cname(b)) => a.host == b.host,
            (Self::Txt(a), Self::Txt(b)) => a.text == b.text,
            _ => false,
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A(r) => write!(f, "A {} ttl={}", r.ip, r.ttl),
            Self::Aaaa(r) => write!(f, "AAAA {} ttl={}", r.ip, r.ttl),
            Self::Cname(r) => write!(f, "CNAME {} ttl={}", r.host, r.ttl),
            Self::Txt(r) => write!(f, "TXT {:?} ttl={}", r.text, r.ttl),
        }
    }
}

/// All records published for one label of a zone.
///
/// Serialized as a flat `type -> [records]` map, the format consumed by the
/// DNS server's store plugin:
///
/// ```json
/// {"a":[{"ip":"10.1.1.10","ttl":3600}],"aaaa":[{"ip":"2a02::1","ttl":3600}]}
/// ```
///
/// Types this crate does not model (`mx`, `srv`, ...) are kept verbatim so a
/// read-modify-write cycle never drops them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RecordSetRepr", into = "RecordSetRepr")]
pub struct RecordSet {
    records: BTreeMap<RecordType, Vec<Record>>,
    foreign: BTreeMap<String, serde_json::Value>,
}

impl RecordSet {
    /// Create an empty record set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record, or refresh the TTL of one with the same data.
    ///
    /// Returns true if the set changed.
    pub fn add(&mut self, record: Record) -> bool {
        let list = self.records.entry(record.record_type()).or_default();
        match list.iter_mut().find(|r| r.same_data(&record)) {
            Some(existing) if *existing == record => false,
            Some(existing) => {
                *existing = record;
                true
            }
            None => {
                list.push(record);
                true
            }
        }
    }

    /// Remove every record with the same data as `record`, whatever its TTL.
    ///
    /// Returns true if the set changed.
    pub fn remove(&mut self, record: &Record) -> bool {
        let rtype = record.record_type();
        let Some(list) = self.records.get_mut(&rtype) else {
            return false;
        };
        let before = list.len();
        list.retain(|r| !r.same_data(record));
        let changed = list.len() != before;
        if list.is_empty() {
            self.records.remove(&rtype);
        }
        changed
    }

    /// Returns true if a record with the same data is present
    #[must_use]
    pub fn contains(&self, record: &Record) -> bool {
        self.get(record.record_type())
            .iter()
            .any(|r| r.same_data(record))
    }

    /// Records of a single type, in insertion order
    #[must_use]
    pub fn get(&self, rtype: RecordType) -> &[Record] {
        self.records.get(&rtype).map_or(&[], Vec::as_slice)
    }

    /// Iterate over every typed record
    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.values().flatten()
    }

    /// Number of typed records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }

    /// Returns true if every record list, including foreign ones, is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.values().all(Vec::is_empty)
            && self
                .foreign
                .values()
                .all(|v| v.is_null() || v.as_array().is_some_and(Vec::is_empty))
    }
}

/// Wire shape of a [`RecordSet`]: one list per record-type key.
#[derive(Default, Serialize, Deserialize)]
struct RecordSetRepr {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    a: Vec<ARecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    aaaa: Vec<AaaaRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    cname: Vec<CnameRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    txt: Vec<TxtRecord>,
    #[serde(flatten)]
    foreign: BTreeMap<String, serde_json::Value>,
}

impl From<RecordSetRepr> for RecordSet {
    fn from(repr: RecordSetRepr) -> Self {
        let mut records = BTreeMap::new();
        let mut put = |rtype: RecordType, list: Vec<Record>| {
            if !list.is_empty() {
                records.insert(rtype, list);
            }
        };
        put(RecordType::A, repr.a.into_iter().map(Record::A).collect());
        put(RecordType::Aaaa, repr.aaaa.into_iter().map(Record::Aaaa).collect());
        put(RecordType::Cname, repr.cname.into_iter().map(Record::Cname).collect());
        put(RecordType::Txt, repr.txt.into_iter().map(Record::Txt).collect());

        Self {
            records,
            foreign: repr.foreign,
        }
    }
}

impl From<RecordSet> for RecordSetRepr {
    fn from(set: RecordSet) -> Self {
        let mut repr = Self {
            foreign: set.foreign,
            ..Self::default()
        };
        for record in set.records.into_values().flatten() {
            match record {
                Record::A(r) => repr.a.push(r),
                Record::Aaaa(r) => repr.aaaa.push(r),
                Record::Cname(r) => repr.cname.push(r),
                Record::Txt(r) => repr.txt.push(r),
            }
        }
        repr
    }
}
