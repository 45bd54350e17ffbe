//! Property tests for message framing.
//!
//! These tests verify that decoding is robust against fragmentation at
//! arbitrary byte boundaries: a record never decodes before its last byte is
//! delivered, an incomplete attempt leaves the stream untouched, and the
//! eventual result does not depend on how the bytes were split.

#[cfg(test)]
mod tests {
    use super::super::client::*;
    use super::super::server::*;
    use super::super::types::*;
    use crate::decode::{self, Decode};
    use crate::io::{ByteStream, PeekStream};
    use bytes::BytesMut;
    use chrono::{Duration, TimeZone, Utc};
    use proptest::prelude::*;
    use rfb_common::TimeSpan;

    /// Deliver `data` in chunks cut at `cuts`, attempting a commit after each
    /// delivery. Returns the decoded value and the number of deliveries made
    /// before it succeeded.
    fn deliver_fragmented<T: Decode>(data: &[u8], cuts: &[usize]) -> (T, usize, TimeSpan) {
        let mut bounds: Vec<usize> = cuts.iter().map(|c| c % (data.len() + 1)).collect();
        bounds.push(data.len());
        bounds.retain(|&b| b > 0);
        bounds.sort_unstable();
        bounds.dedup();

        let base = Utc.timestamp_millis_opt(1_600_000_000_000).unwrap();
        let mut stream = ByteStream::new();
        let mut start = 0;
        for (i, end) in bounds.into_iter().enumerate() {
            stream.push(data[start..end].to_vec(), base + Duration::milliseconds(i as i64));
            let before = stream.length();
            match decode::commit::<T>(&mut stream) {
                Ok(decoded) => {
                    assert_eq!(end, data.len(), "decoded before the last byte arrived");
                    assert_eq!(decoded.consumed, data.len());
                    assert_eq!(stream.length(), 0);
                    assert_eq!(decoded.span.first, base);
                    return (decoded.value, i, decoded.span);
                }
                Err(err) => {
                    assert!(err.is_incomplete(), "unexpected error {err}");
                    assert_eq!(stream.length(), before);
                }
            }
            start = end;
        }
        panic!("record never decoded");
    }

    fn arbitrary_pixel_format() -> impl Strategy<Value = PixelFormat> {
        (
            prop::sample::select(vec![8u8, 16, 24, 32]),
            prop::sample::select(vec![8u8, 16, 24]),
            any::<u8>(),
            prop::sample::select(vec![15u16, 31, 63, 127, 255]),
        )
            .prop_map(|(bpp, depth, big_endian, max)| PixelFormat {
                bits_per_pixel: bpp,
                depth,
                big_endian,
                true_color: 1,
                red_max: max,
                green_max: max,
                blue_max: max,
                red_shift: 0,
                green_shift: bpp / 3,
                blue_shift: 2 * (bpp / 3),
            })
    }

    fn arbitrary_server_init() -> impl Strategy<Value = ServerInit> {
        (
            1u16..=7680,
            1u16..=4320,
            arbitrary_pixel_format(),
            "[a-zA-Z0-9 ]{0,100}",
        )
            .prop_map(|(width, height, pf, name)| ServerInit {
                framebuffer_width: width,
                framebuffer_height: height,
                pixel_format: pf,
                name: name.into_bytes(),
            })
    }

    proptest! {
        #[test]
        fn test_server_init_fragmentation(
            server_init in arbitrary_server_init(),
            cuts in prop::collection::vec(any::<usize>(), 0..8)
        ) {
            let mut buf = BytesMut::new();
            server_init.encode(&mut buf);
            let (parsed, _, _) = deliver_fragmented::<ServerInit>(&buf, &cuts);
            prop_assert_eq!(server_init, parsed);
        }

        #[test]
        fn test_set_encodings_fragmentation(
            encodings in prop::collection::vec(any::<i32>(), 0..40),
            cuts in prop::collection::vec(any::<usize>(), 0..8)
        ) {
            let msg = SetEncodings { encodings };
            let mut buf = BytesMut::new();
            msg.encode(&mut buf);
            let (parsed, _, _) = deliver_fragmented::<SetEncodings>(&buf, &cuts);
            prop_assert_eq!(msg, parsed);
        }

        #[test]
        fn test_zlib_rectangle_fragmentation(
            data in prop::collection::vec(any::<u8>(), 0..2000),
            cuts in prop::collection::vec(any::<usize>(), 0..8)
        ) {
            let rect = ZlibRectangle {
                header: Rectangle { x: 0, y: 0, width: 64, height: 64, encoding: ENCODING_ZLIB },
                data,
            };
            let mut buf = BytesMut::new();
            rect.encode(&mut buf);
            let (parsed, deliveries, span) = deliver_fragmented::<ZlibRectangle>(&buf, &cuts);
            prop_assert_eq!(rect, parsed);
            prop_assert_eq!(
                span.last,
                Utc.timestamp_millis_opt(1_600_000_000_000).unwrap()
                    + Duration::milliseconds(deliveries as i64)
            );
        }

        #[test]
        fn test_cut_text_fragmentation(
            text in prop::collection::vec(any::<u8>(), 0..600),
            cuts in prop::collection::vec(any::<usize>(), 0..8)
        ) {
            let msg = CutText { text };
            let mut buf = BytesMut::new();
            msg.encode(3, &mut buf);
            let (parsed, _, _) = deliver_fragmented::<CutText>(&buf, &cuts);
            prop_assert_eq!(msg, parsed);
        }
    }
}
