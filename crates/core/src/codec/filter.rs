//! Filter strategy trait, registry, and chain decoding.

use crate::codec::{ascii85, flate, lzw, predictor, runlength};
use crate::error::{PdfError, Result};
use crate::limits::MemoryLimitsAwareHandler;
use crate::model::{PdfDict, PdfObject, PdfStream};

/// One stream filter, usable in both directions.
///
/// `decode` receives the filter's decode parameters so predictor-capable
/// filters can undo row prediction; `encode` produces data the same
/// filter would decode back, without applying prediction.
pub trait FilterStrategy: Send + Sync {
    /// The canonical `/Filter` name.
    fn name(&self) -> &'static str;

    fn decode(&self, data: &[u8], parms: Option<&PdfDict>) -> Result<Vec<u8>>;

    fn encode(&self, data: &[u8]) -> Result<Vec<u8>>;
}

struct FlateFilter;

impl FilterStrategy for FlateFilter {
    fn name(&self) -> &'static str {
        "FlateDecode"
    }

    fn decode(&self, data: &[u8], parms: Option<&PdfDict>) -> Result<Vec<u8>> {
        predictor::apply_predictor(flate::flatedecode(data)?, parms)
    }

    fn encode(&self, data: &[u8]) -> Result<Vec<u8>> {
        flate::flateencode(data)
    }
}

struct LzwFilter;

impl FilterStrategy for LzwFilter {
    fn name(&self) -> &'static str {
        "LZWDecode"
    }

    fn decode(&self, data: &[u8], parms: Option<&PdfDict>) -> Result<Vec<u8>> {
        let early_change = match parms.and_then(|p| p.get("EarlyChange")) {
            Some(PdfObject::Int(n)) => *n,
            _ => 1,
        };
        predictor::apply_predictor(lzw::lzwdecode_with_earlychange(data, early_change)?, parms)
    }

    fn encode(&self, data: &[u8]) -> Result<Vec<u8>> {
        lzw::lzwencode(data)
    }
}

struct Ascii85Filter;

impl FilterStrategy for Ascii85Filter {
    fn name(&self) -> &'static str {
        "ASCII85Decode"
    }

    fn decode(&self, data: &[u8], _parms: Option<&PdfDict>) -> Result<Vec<u8>> {
        ascii85::ascii85decode(data)
    }

    fn encode(&self, data: &[u8]) -> Result<Vec<u8>> {
        ascii85::ascii85encode(data)
    }
}

struct AsciiHexFilter;

impl FilterStrategy for AsciiHexFilter {
    fn name(&self) -> &'static str {
        "ASCIIHexDecode"
    }

    fn decode(&self, data: &[u8], _parms: Option<&PdfDict>) -> Result<Vec<u8>> {
        ascii85::asciihexdecode(data)
    }

    fn encode(&self, data: &[u8]) -> Result<Vec<u8>> {
        ascii85::asciihexencode(data)
    }
}

struct RunLengthFilter;

impl FilterStrategy for RunLengthFilter {
    fn name(&self) -> &'static str {
        "RunLengthDecode"
    }

    fn decode(&self, data: &[u8], _parms: Option<&PdfDict>) -> Result<Vec<u8>> {
        runlength::rldecode(data)
    }

    fn encode(&self, data: &[u8]) -> Result<Vec<u8>> {
        runlength::rlencode(data)
    }
}

/// Look up the strategy for a `/Filter` name, accepting the inline-image
/// abbreviations.
pub fn strategy_for(name: &str) -> Result<&'static dyn FilterStrategy> {
    match name {
        "FlateDecode" | "Fl" => Ok(&FlateFilter),
        "LZWDecode" | "LZW" => Ok(&LzwFilter),
        "ASCII85Decode" | "A85" => Ok(&Ascii85Filter),
        "ASCIIHexDecode" | "AHx" => Ok(&AsciiHexFilter),
        "RunLengthDecode" | "RL" => Ok(&RunLengthFilter),
        other => Err(PdfError::FilterNotSupported(other.to_string())),
    }
}

/// Decode a stream through its declared filter chain.
///
/// Filters apply in declaration order: the first name listed is the first
/// undone. Chains the limits handler deems suspicious are accounted
/// through a stream scope, so a decompression bomb fails before memory
/// does; the scope commits only when the whole chain decodes.
pub fn decode_chain(stream: &PdfStream, limits: &MemoryLimitsAwareHandler) -> Result<Vec<u8>> {
    let filters = stream.filter_names();
    if filters.is_empty() {
        return Ok(stream.get_rawdata().to_vec());
    }
    let parms = stream.decode_parms();

    let mut scope = limits
        .is_accounting_required(&filters)
        .then(|| limits.begin_stream_scope());

    let mut data = stream.get_rawdata().to_vec();
    for (i, name) in filters.iter().enumerate() {
        let strategy = strategy_for(name)?;
        data = strategy.decode(&data, parms.get(i).copied().flatten())?;
        if let Some(scope) = scope.as_mut() {
            scope.consider(data.len())?;
        }
    }

    if let Some(scope) = scope.take() {
        scope.commit();
    }
    Ok(data)
}

/// Encode data for a filter chain, producing bytes [`decode_chain`] would
/// decode back through the same `/Filter` declaration.
///
/// Encoders run in the reverse of declaration order, since the first
/// declared filter is the first undone on read.
pub fn encode_chain(data: &[u8], filters: &[&str]) -> Result<Vec<u8>> {
    let mut out = data.to_vec();
    for name in filters.iter().rev() {
        out = strategy_for(name)?.encode(&out)?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::flate::flateencode;

    fn stream_with(filter: PdfObject, rawdata: Vec<u8>) -> PdfStream {
        let mut attrs = PdfDict::new();
        attrs.insert("Filter".into(), filter);
        attrs.insert("Length".into(), PdfObject::Int(rawdata.len() as i64));
        PdfStream::new(attrs, rawdata)
    }

    #[test]
    fn unknown_filter_is_rejected() {
        assert!(matches!(
            strategy_for("JBIG2Decode"),
            Err(PdfError::FilterNotSupported(name)) if name == "JBIG2Decode"
        ));
    }

    #[test]
    fn single_flate_chain() {
        let payload = b"chained payload".to_vec();
        let stream = stream_with(
            PdfObject::Name("FlateDecode".into()),
            flateencode(&payload).unwrap(),
        );
        let limits = MemoryLimitsAwareHandler::default();
        assert_eq!(decode_chain(&stream, &limits).unwrap(), payload);
        // Single-filter chains are not accounted
        assert_eq!(limits.committed_bytes(), 0);
    }

    #[test]
    fn mixed_chain_applies_left_to_right_and_commits() {
        let payload = b"hello hello hello".to_vec();
        let flated = flateencode(&payload).unwrap();
        let hexed = ascii85::asciihexencode(&flated).unwrap();
        let stream = stream_with(
            PdfObject::Array(vec![
                PdfObject::Name("ASCIIHexDecode".into()),
                PdfObject::Name("FlateDecode".into()),
            ]),
            hexed,
        );
        let limits = MemoryLimitsAwareHandler::default();
        assert_eq!(decode_chain(&stream, &limits).unwrap(), payload);
        // Two distinct filter kinds: every intermediate size is committed
        assert_eq!(limits.committed_bytes(), flated.len() + payload.len());
    }

    #[test]
    fn suspicious_chain_hits_limits() {
        let payload = vec![0u8; 100_000];
        let flated = flateencode(&payload).unwrap();
        let hexed = ascii85::asciihexencode(&flated).unwrap();
        let stream = stream_with(
            PdfObject::Array(vec![
                PdfObject::Name("ASCIIHexDecode".into()),
                PdfObject::Name("FlateDecode".into()),
            ]),
            hexed,
        );
        let limits = MemoryLimitsAwareHandler::with_budget(16);
        let err = decode_chain(&stream, &limits).unwrap_err();
        assert!(matches!(err, PdfError::SingleStreamLimitExceeded { .. }));
        // Failed chains leave nothing committed
        assert_eq!(limits.committed_bytes(), 0);
    }

    #[test]
    fn encode_chain_inverts_decode_chain() {
        let payload = b"two-step payload".to_vec();
        let names = ["ASCIIHexDecode", "FlateDecode"];
        let encoded = encode_chain(&payload, &names).unwrap();
        let stream = stream_with(
            PdfObject::Array(names.iter().map(|n| PdfObject::Name((*n).into())).collect()),
            encoded,
        );
        let limits = MemoryLimitsAwareHandler::default();
        assert_eq!(decode_chain(&stream, &limits).unwrap(), payload);
    }

    #[test]
    fn no_filter_returns_raw() {
        let stream = PdfStream::new(PdfDict::new(), b"raw".to_vec());
        let limits = MemoryLimitsAwareHandler::default();
        assert_eq!(decode_chain(&stream, &limits).unwrap(), b"raw");
    }
}
