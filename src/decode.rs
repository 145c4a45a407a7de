//! Decoding collaborator.
//!
//! The session never parses compressed audio itself: it hands the bytes to
//! a [`Decode`] implementation. In the browser that is the host's
//! `decodeAudioData`, whose result arrives through
//! [`Session::load_decoded`](crate::session::Session::load_decoded);
//! natively, [`Mp3Decoder`] is available behind the `mp3` feature.

use crate::buffer::AudioBuffer;
use crate::error::DecodeError;

/// MIME type the importer accepts.
pub const ACCEPTED_MIME: &str = "audio/mpeg";
/// File extension the importer accepts when no MIME type is known.
pub const ACCEPTED_EXTENSION: &str = "mp3";

/// Turns compressed file bytes into a planar float buffer.
pub trait Decode {
    fn decode(&self, bytes: &[u8]) -> Result<AudioBuffer, DecodeError>;
}

/// Whether a picked file is the accepted compressed type.
pub fn is_supported(mime: &str, file_name: &str) -> bool {
    if !mime.is_empty() {
        return mime.eq_ignore_ascii_case(ACCEPTED_MIME);
    }
    file_name
        .rsplit_once('.')
        .is_some_and(|(_, ext)| ext.eq_ignore_ascii_case(ACCEPTED_EXTENSION))
}

/// Native MP3 decoder backed by minimp3.
#[cfg(feature = "mp3")]
#[derive(Debug, Default, Clone, Copy)]
pub struct Mp3Decoder;

#[cfg(feature = "mp3")]
impl Decode for Mp3Decoder {
    fn decode(&self, bytes: &[u8]) -> Result<AudioBuffer, DecodeError> {
        use minimp3::{Decoder, Error, Frame};
        use std::io::Cursor;

        let mut decoder = Decoder::new(Cursor::new(bytes));
        let mut channels: Vec<Vec<f32>> = Vec::new();
        let mut format: Option<(usize, i32)> = None;
        let mut index = 0;

        loop {
            match decoder.next_frame() {
                Ok(Frame { data, sample_rate, channels: count, .. }) => {
                    if count == 0 || data.is_empty() {
                        continue;
                    }
                    match format {
                        None => {
                            format = Some((count, sample_rate));
                            channels = vec![Vec::new(); count];
                        }
                        Some(f) if f != (count, sample_rate) => {
                            return Err(DecodeError::FormatChange { frame: index });
                        }
                        Some(_) => {}
                    }
                    for frame in data.chunks_exact(count) {
                        for (ch, &s) in channels.iter_mut().zip(frame) {
                            ch.push(s as f32 / 32768.0);
                        }
                    }
                    index += 1;
                }
                Err(Error::Eof) | Err(Error::InsufficientData) => break,
                Err(Error::SkippedData) => continue,
                Err(Error::Io(e)) => {
                    return Err(DecodeError::Malformed { frame: index, reason: e.to_string() });
                }
            }
        }

        let (_, sample_rate) = format.ok_or(DecodeError::Empty)?;
        if channels.first().is_none_or(|c| c.is_empty()) {
            return Err(DecodeError::Empty);
        }
        log::debug!("decoded {index} mp3 frames at {sample_rate} Hz");
        AudioBuffer::from_channels(channels, sample_rate as u32)
            .map_err(|e| DecodeError::Malformed { frame: index, reason: e.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_mpeg_mime() {
        assert!(is_supported("audio/mpeg", "song.bin"));
        assert!(is_supported("AUDIO/MPEG", "song"));
        assert!(!is_supported("audio/wav", "song.mp3"));
    }

    #[test]
    fn falls_back_to_extension_without_mime() {
        assert!(is_supported("", "My Track.MP3"));
        assert!(!is_supported("", "notes.txt"));
        assert!(!is_supported("", "mp3"));
    }

    #[cfg(feature = "mp3")]
    #[test]
    fn garbage_bytes_do_not_decode() {
        let err = Mp3Decoder.decode(&[0u8; 64]).unwrap_err();
        assert!(matches!(err, DecodeError::Empty));
    }
}
