//! Conversion between float samples, 16-bit little-endian PCM and the text-safe
//! framing used on the transport.
//!
//! Everything in here is pure: no I/O and no state.

use crate::error::FormatError;
use crate::{EncodedChunk, SampleFrame, WIRE_SAMPLE_RATE};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::{BufMut, BytesMut};

/// Raw bytes encoded per base64 pass. Multiple of 3 so no padding is emitted mid-stream.
const TRANSPORT_CHUNK_BYTES: usize = 3 * 4096;
/// Characters decoded per base64 pass. Multiple of 4 so every pass is a whole quantum.
const TRANSPORT_CHUNK_CHARS: usize = 4 * 4096;

/// Encodes samples as PCM16 little-endian.
///
/// Samples are clamped to `[-1.0, 1.0]`. Negative values scale by 32768 and non-negative ones
/// by 32767, so `+1.0` does not overflow.
pub fn encode_pcm16(samples: &[f32]) -> EncodedChunk {
    let mut buf = BytesMut::with_capacity(samples.len() * 2);
    for &sample in samples {
        buf.put_i16_le(sample_to_i16(sample));
    }
    buf.freeze()
}

/// Decodes PCM16 little-endian into a frame at [`WIRE_SAMPLE_RATE`].
pub fn decode_pcm16(bytes: &[u8]) -> Result<SampleFrame, FormatError> {
    let mut samples = Vec::new();
    decode_pcm16_into(bytes, &mut samples)?;
    Ok(SampleFrame::new(samples, WIRE_SAMPLE_RATE))
}

/// Decodes PCM16 little-endian into `out`, replacing its contents but keeping its allocation.
///
/// `out` is left untouched if `bytes` is not a whole number of samples.
pub fn decode_pcm16_into(bytes: &[u8], out: &mut Vec<f32>) -> Result<(), FormatError> {
    if bytes.len() % 2 != 0 {
        return Err(FormatError::OddLength(bytes.len()));
    }

    out.clear();
    out.reserve(bytes.len() / 2);
    out.extend(
        bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0),
    );
    Ok(())
}

/// Wraps binary data in standard, padded base64.
pub fn to_transport_text(bytes: &[u8]) -> String {
    let mut text = String::with_capacity(base64::encoded_len(bytes.len(), true).unwrap_or(0));
    for chunk in bytes.chunks(TRANSPORT_CHUNK_BYTES) {
        STANDARD.encode_string(chunk, &mut text);
    }
    text
}

/// Reverses [`to_transport_text`].
pub fn from_transport_text(text: &str) -> Result<EncodedChunk, FormatError> {
    let encoded = text.as_bytes();
    let mut bytes = Vec::with_capacity(base64::decoded_len_estimate(encoded.len()));

    let mut chunks = encoded.chunks(TRANSPORT_CHUNK_CHARS).peekable();
    while let Some(chunk) = chunks.next() {
        // Padding is only valid at the very end of the text.
        if chunks.peek().is_some() && chunk.ends_with(b"=") {
            return Err(FormatError::TransportText(
                "padding before end of input".to_string(),
            ));
        }
        STANDARD
            .decode_vec(chunk, &mut bytes)
            .map_err(|err| FormatError::TransportText(err.to_string()))?;
    }

    Ok(EncodedChunk::from(bytes))
}

#[inline]
fn sample_to_i16(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::{assert_eq, assert_matches};

    #[test]
    fn encode_scales_asymmetrically() {
        let bytes = encode_pcm16(&[1.0, -1.0, 0.0, 0.5]);
        assert_eq!(
            bytes.as_ref(),
            &[0xff, 0x7f, 0x00, 0x80, 0x00, 0x00, 0xff, 0x3f][..]
        );
    }

    #[test]
    fn encode_clamps_out_of_range() {
        let clamped = encode_pcm16(&[3.5, -7.0]);
        let limits = encode_pcm16(&[1.0, -1.0]);
        assert_eq!(clamped, limits);
    }

    #[test]
    fn encode_empty() {
        assert!(encode_pcm16(&[]).is_empty());
        assert!(decode_pcm16(&[]).unwrap().is_empty());
    }

    #[test]
    fn decode_divides_by_32768() {
        let frame = decode_pcm16(&[0x00, 0x80, 0x00, 0x40, 0xff, 0x7f]).unwrap();
        assert_eq!(frame.sample_rate(), WIRE_SAMPLE_RATE);
        assert_eq!(frame.samples(), &[-1.0, 0.5, 32767.0 / 32768.0][..]);
    }

    #[test]
    fn decode_rejects_odd_length() {
        assert_matches!(decode_pcm16(&[0x00, 0x01, 0x02]), Err(FormatError::OddLength(3)));
    }

    #[test]
    fn decode_into_keeps_output_on_error() {
        let mut out = vec![0.25, 0.5];
        assert!(decode_pcm16_into(&[0x01], &mut out).is_err());
        assert_eq!(out, vec![0.25, 0.5]);
    }

    #[test]
    fn pcm_round_trip_within_quantization() {
        let samples: Vec<f32> = (0..=2000).map(|i| i as f32 / 1000.0 - 1.0).collect();
        let decoded = decode_pcm16(&encode_pcm16(&samples)).unwrap();

        assert_eq!(decoded.len(), samples.len());
        for (original, decoded) in samples.iter().zip(decoded.samples()) {
            // Non-negative samples are scaled by 32767 but decoded by 32768.
            assert!(
                (original - decoded).abs() <= 2.0 / 32768.0,
                "{original} decoded as {decoded}"
            );
        }
    }

    #[test]
    fn transport_text_is_standard_base64() {
        assert_eq!(to_transport_text(b""), "");
        assert_eq!(to_transport_text(b"f"), "Zg==");
        assert_eq!(to_transport_text(b"foobar"), "Zm9vYmFy");
    }

    #[test]
    fn transport_text_round_trip_across_chunk_boundaries() {
        for len in [
            0,
            1,
            2,
            3,
            TRANSPORT_CHUNK_BYTES - 1,
            TRANSPORT_CHUNK_BYTES,
            TRANSPORT_CHUNK_BYTES + 1,
            3 * TRANSPORT_CHUNK_BYTES + 2,
        ] {
            let bytes: Vec<u8> = (0..len).map(|i| (i * 31 % 251) as u8).collect();
            let text = to_transport_text(&bytes);
            assert_eq!(text, STANDARD.encode(&bytes), "length {len}");
            assert_eq!(from_transport_text(&text).unwrap().as_ref(), &bytes[..]);
        }
    }

    #[test]
    fn transport_text_rejects_malformed_input() {
        assert_matches!(
            from_transport_text("not base64!"),
            Err(FormatError::TransportText(_))
        );
        assert_matches!(from_transport_text("Zg="), Err(FormatError::TransportText(_)));
        assert_matches!(from_transport_text("Zg==Zg=="), Err(FormatError::TransportText(_)));
        assert_matches!(from_transport_text("äöü"), Err(FormatError::TransportText(_)));
    }

    #[test]
    fn transport_text_rejects_padding_on_chunk_boundary() {
        let mut text = "A".repeat(TRANSPORT_CHUNK_CHARS - 4);
        text.push_str("AA==");
        text.push_str("AAAA");
        assert_matches!(from_transport_text(&text), Err(FormatError::TransportText(_)));
    }
}
