// ABOUTME: Splits a raw console byte stream into lines at LF boundaries
// ABOUTME: Buffers undecoded bytes so multi-byte sequences survive chunk splits

/// Line terminator written by the attached console and appended to commands.
pub const LINE_TERMINATOR: u8 = b'\n';

/// Accumulates console output and yields complete lines.
///
/// The partial buffer never holds a terminator: every complete line is handed
/// back from [`LineFramer::push`] as soon as its terminator arrives. Bytes are
/// kept raw until a line is complete, so a UTF-8 sequence split across two
/// reads is decoded intact.
#[derive(Debug, Default)]
pub struct LineFramer {
    partial: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completes, oldest first.
    ///
    /// Returned lines exclude the terminator byte. Whatever follows the last
    /// terminator in `chunk` becomes the new partial buffer.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        let mut lines = Vec::new();
        let mut start = 0;

        while let Some(offset) = chunk[start..]
            .iter()
            .position(|&b| b == LINE_TERMINATOR)
        {
            let end = start + offset;
            let mut line = std::mem::take(&mut self.partial);
            line.extend_from_slice(&chunk[start..end]);
            lines.push(line);
            start = end + 1;
        }

        self.partial.extend_from_slice(&chunk[start..]);
        lines
    }

    /// Bytes received since the last terminator.
    pub fn partial(&self) -> &[u8] {
        &self.partial
    }

    /// Drain the partial buffer, e.g. when the attached process exits.
    pub fn take_partial(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.partial)
    }

    pub fn is_empty(&self) -> bool {
        self.partial.is_empty()
    }

    pub fn clear(&mut self) {
        self.partial.clear();
    }
}

/// Decode a completed line for delivery.
///
/// Invalid UTF-8 is replaced rather than rejected, and one trailing `\r` is
/// dropped since consoles attached through a TTY terminate lines with CRLF.
pub fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reassemble(lines: &[Vec<u8>], partial: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        for line in lines {
            out.extend_from_slice(line);
            out.push(LINE_TERMINATOR);
        }
        out.extend_from_slice(partial);
        out
    }

    #[test]
    fn single_chunk_with_two_lines() {
        let mut framer = LineFramer::new();
        let lines = framer.push(b"first\nsecond\n");
        assert_eq!(lines, vec![b"first".to_vec(), b"second".to_vec()]);
        assert!(framer.is_empty());
    }

    #[test]
    fn trailing_bytes_stay_partial() {
        let mut framer = LineFramer::new();
        let lines = framer.push(b"done\npart");
        assert_eq!(lines, vec![b"done".to_vec()]);
        assert_eq!(framer.partial(), b"part");
    }

    #[test]
    fn line_spanning_chunks_is_joined() {
        let mut framer = LineFramer::new();
        assert!(framer.push(b"There are ").is_empty());
        assert!(framer.push(b"0 of a max").is_empty());
        let lines = framer.push(b" of 20\n");
        assert_eq!(lines, vec![b"There are 0 of a max of 20".to_vec()]);
        assert!(framer.is_empty());
    }

    #[test]
    fn terminator_arriving_alone_closes_buffered_line() {
        let mut framer = LineFramer::new();
        assert!(framer.push(b"buffered").is_empty());
        let lines = framer.push(b"\n");
        assert_eq!(lines, vec![b"buffered".to_vec()]);
        assert!(framer.is_empty());
    }

    #[test]
    fn empty_lines_are_emitted() {
        let mut framer = LineFramer::new();
        let lines = framer.push(b"\n\nx\n");
        assert_eq!(lines, vec![Vec::new(), Vec::new(), b"x".to_vec()]);
    }

    #[test]
    fn lines_never_contain_terminator() {
        let mut framer = LineFramer::new();
        for chunk in [&b"a\nb"[..], b"c\n\nd", b"\ne"] {
            for line in framer.push(chunk) {
                assert!(!line.contains(&LINE_TERMINATOR));
            }
            assert!(!framer.partial().contains(&LINE_TERMINATOR));
        }
    }

    #[test]
    fn arbitrary_chunking_reconstructs_stream() {
        let stream: &[u8] =
            b"[Server thread/INFO]: Done (3.2s)!\nplayer joined\n\nno newline at end";
        for split in 1..stream.len() {
            let mut framer = LineFramer::new();
            let mut lines = Vec::new();
            for chunk in stream.chunks(split) {
                lines.extend(framer.push(chunk));
            }
            assert_eq!(
                reassemble(&lines, framer.partial()),
                stream,
                "chunk size {split}"
            );
        }
    }

    #[test]
    fn multibyte_sequence_split_across_chunks() {
        let text = "héllo wörld\n".as_bytes();
        // split in the middle of the two-byte 'é'
        let (a, b) = text.split_at(2);
        let mut framer = LineFramer::new();
        assert!(framer.push(a).is_empty());
        let lines = framer.push(b);
        assert_eq!(lines.len(), 1);
        assert_eq!(decode_line(&lines[0]), "héllo wörld");
    }

    #[test]
    fn take_partial_drains_buffer() {
        let mut framer = LineFramer::new();
        framer.push(b"tail");
        assert_eq!(framer.take_partial(), b"tail".to_vec());
        assert!(framer.is_empty());
    }

    #[test]
    fn decode_strips_single_carriage_return() {
        assert_eq!(decode_line(b"ok\r"), "ok");
        assert_eq!(decode_line(b"ok\r\r"), "ok\r");
        assert_eq!(decode_line(b"ok"), "ok");
    }

    #[test]
    fn decode_replaces_invalid_utf8() {
        assert_eq!(decode_line(&[b'a', 0xff, b'b']), "a\u{fffd}b");
    }
}
