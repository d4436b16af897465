//! PDF object types.

use crate::error::{PdfError, Result};
use bytes::Bytes;
use indexmap::IndexMap;
use smallvec::SmallVec;

/// PDF dictionary; insertion order is preserved so serialization is
/// deterministic.
pub type PdfDict = IndexMap<String, PdfObject>;

/// PDF object types - the fundamental value type in PDF.
#[derive(Debug, Clone, PartialEq)]
pub enum PdfObject {
    /// Null object
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Real (floating point) value
    Real(f64),
    /// Name object (e.g., /Type, /Root)
    Name(String),
    /// String (byte array)
    String(Vec<u8>),
    /// Array of objects
    Array(Vec<Self>),
    /// Dictionary (name -> object mapping)
    Dict(PdfDict),
    /// Stream (dictionary + binary data)
    Stream(Box<PdfStream>),
    /// Indirect object reference
    Ref(PdfRef),
}

impl PdfObject {
    /// Check if this is a null object
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get as boolean
    pub const fn as_bool(&self) -> Result<bool> {
        match self {
            Self::Bool(b) => Ok(*b),
            _ => Err(PdfError::TypeError {
                expected: "bool",
                got: self.type_name(),
            }),
        }
    }

    /// Get as integer
    pub const fn as_int(&self) -> Result<i64> {
        match self {
            Self::Int(n) => Ok(*n),
            _ => Err(PdfError::TypeError {
                expected: "int",
                got: self.type_name(),
            }),
        }
    }

    /// Get numeric value (int or real coerced to f64)
    pub const fn as_num(&self) -> Result<f64> {
        match self {
            Self::Int(n) => Ok(*n as f64),
            Self::Real(n) => Ok(*n),
            _ => Err(PdfError::TypeError {
                expected: "number",
                got: self.type_name(),
            }),
        }
    }

    /// Get as name string
    pub fn as_name(&self) -> Result<&str> {
        match self {
            Self::Name(s) => Ok(s),
            _ => Err(PdfError::TypeError {
                expected: "name",
                got: self.type_name(),
            }),
        }
    }

    /// Get as byte string
    pub fn as_string(&self) -> Result<&[u8]> {
        match self {
            Self::String(s) => Ok(s),
            _ => Err(PdfError::TypeError {
                expected: "string",
                got: self.type_name(),
            }),
        }
    }

    /// Get as array
    pub const fn as_array(&self) -> Result<&Vec<Self>> {
        match self {
            Self::Array(arr) => Ok(arr),
            _ => Err(PdfError::TypeError {
                expected: "array",
                got: self.type_name(),
            }),
        }
    }

    /// Get as dictionary
    pub fn as_dict(&self) -> Result<&PdfDict> {
        match self {
            Self::Dict(d) => Ok(d),
            _ => Err(PdfError::TypeError {
                expected: "dict",
                got: self.type_name(),
            }),
        }
    }

    /// Get as stream
    pub fn as_stream(&self) -> Result<&PdfStream> {
        match self {
            Self::Stream(s) => Ok(s),
            _ => Err(PdfError::TypeError {
                expected: "stream",
                got: self.type_name(),
            }),
        }
    }

    /// Get as object reference
    pub const fn as_ref(&self) -> Result<PdfRef> {
        match self {
            Self::Ref(r) => Ok(*r),
            _ => Err(PdfError::TypeError {
                expected: "ref",
                got: self.type_name(),
            }),
        }
    }

    /// Get type name for error messages
    pub(crate) const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Real(_) => "real",
            Self::Name(_) => "name",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Dict(_) => "dict",
            Self::Stream(_) => "stream",
            Self::Ref(_) => "ref",
        }
    }
}

/// PDF indirect object reference.
///
/// Object number 0 is reserved for the free-list sentinel; generation
/// numbers saturate at 65535 by convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PdfRef {
    /// Object number
    pub objid: u32,
    /// Generation number
    pub genno: u16,
}

impl PdfRef {
    /// Maximum generation number; a freed slot that reaches it is never
    /// reused.
    pub const MAX_GEN: u16 = 65535;

    /// Create a new object reference.
    pub const fn new(objid: u32, genno: u16) -> Self {
        Self { objid, genno }
    }

    /// The free-list sentinel reference (object 0, generation 65535).
    pub const fn sentinel() -> Self {
        Self::new(0, Self::MAX_GEN)
    }
}

impl std::fmt::Display for PdfRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} R", self.objid, self.genno)
    }
}

/// A reference qualified by its owning document.
///
/// References from different documents never compare equal; ordering is
/// lexicographic on (object number, generation) with the document id
/// breaking ties, so cross-document comparisons stay deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnedRef {
    /// Monotonically increasing id of the owning document.
    pub doc: u64,
    /// The reference within that document.
    pub r: PdfRef,
}

impl OwnedRef {
    pub const fn new(doc: u64, r: PdfRef) -> Self {
        Self { doc, r }
    }
}

impl PartialOrd for OwnedRef {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OwnedRef {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.r.objid, self.r.genno, self.doc).cmp(&(other.r.objid, other.r.genno, other.doc))
    }
}

/// PDF stream - dictionary attributes + binary data.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfStream {
    /// Stream dictionary attributes
    pub attrs: PdfDict,
    /// Raw (possibly encoded) data
    rawdata: Bytes,
    /// Object number (set when the stream is part of a document)
    pub objid: Option<u32>,
    /// Generation number
    pub genno: Option<u16>,
}

impl PdfStream {
    /// Create a new stream.
    pub fn new(attrs: PdfDict, rawdata: impl Into<Bytes>) -> Self {
        Self {
            attrs,
            rawdata: rawdata.into(),
            objid: None,
            genno: None,
        }
    }

    /// Set object number and generation number.
    pub const fn set_objid(&mut self, objid: u32, genno: u16) {
        self.objid = Some(objid);
        self.genno = Some(genno);
    }

    /// Get raw (undecoded) data.
    pub fn get_rawdata(&self) -> &[u8] {
        self.rawdata.as_ref()
    }

    /// Get raw data as shared bytes.
    pub fn rawdata_bytes(&self) -> Bytes {
        self.rawdata.clone()
    }

    /// Replace the raw data, e.g. after re-encoding.
    pub fn set_rawdata(&mut self, data: impl Into<Bytes>) {
        self.rawdata = data.into();
    }

    /// Check if the stream dictionary contains a key.
    pub fn contains(&self, name: &str) -> bool {
        self.attrs.contains_key(name)
    }

    /// Get attribute by name.
    pub fn get(&self, name: &str) -> Option<&PdfObject> {
        self.attrs.get(name)
    }

    /// Filter names declared on this stream, outermost first.
    ///
    /// `/Filter` may be a single name or an array of names; anything else
    /// yields an empty chain.
    pub fn filter_names(&self) -> SmallVec<[&str; 2]> {
        let mut names = SmallVec::new();
        match self.get("Filter") {
            Some(PdfObject::Name(name)) => names.push(name.as_str()),
            Some(PdfObject::Array(arr)) => {
                for item in arr {
                    if let PdfObject::Name(name) = item {
                        names.push(name.as_str());
                    }
                }
            }
            _ => {}
        }
        names
    }

    /// Per-filter decode parameter dictionaries, aligned with
    /// [`filter_names`](Self::filter_names).
    pub fn decode_parms(&self) -> SmallVec<[Option<&PdfDict>; 2]> {
        let mut parms = SmallVec::new();
        match self.get("DecodeParms").or_else(|| self.get("DP")) {
            Some(PdfObject::Dict(d)) => parms.push(Some(d)),
            Some(PdfObject::Array(arr)) => {
                for item in arr {
                    match item {
                        PdfObject::Dict(d) => parms.push(Some(d)),
                        _ => parms.push(None),
                    }
                }
            }
            _ => {}
        }
        parms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessor_type_errors() {
        let obj = PdfObject::Int(42);
        assert_eq!(obj.as_int().unwrap(), 42);
        assert!(matches!(
            obj.as_dict(),
            Err(PdfError::TypeError {
                expected: "dict",
                got: "int"
            })
        ));
    }

    #[test]
    fn owned_ref_ordering_is_deterministic() {
        let a = OwnedRef::new(1, PdfRef::new(5, 0));
        let b = OwnedRef::new(2, PdfRef::new(5, 0));
        let c = OwnedRef::new(1, PdfRef::new(5, 1));
        assert!(a < b);
        assert!(b < c);
        assert_ne!(a, b);
    }

    #[test]
    fn filter_names_single_and_array() {
        let mut attrs = PdfDict::new();
        attrs.insert("Filter".into(), PdfObject::Name("FlateDecode".into()));
        let stream = PdfStream::new(attrs, Vec::new());
        assert_eq!(stream.filter_names().as_slice(), &["FlateDecode"]);

        let mut attrs = PdfDict::new();
        attrs.insert(
            "Filter".into(),
            PdfObject::Array(vec![
                PdfObject::Name("ASCII85Decode".into()),
                PdfObject::Name("FlateDecode".into()),
            ]),
        );
        let stream = PdfStream::new(attrs, Vec::new());
        assert_eq!(
            stream.filter_names().as_slice(),
            &["ASCII85Decode", "FlateDecode"]
        );
    }
}
