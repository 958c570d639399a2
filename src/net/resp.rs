//! RESP2 encode/decode: just enough of the protocol to speak commands and
//! read replies against a RESP-speaking keyspace server, plus a byte-exact
//! command-frame reader used by the backlog forwarder (it needs the raw
//! bytes it read, not a re-serialization of what it parsed).

use std::future::Future;
use std::io;
use std::pin::Pin;

use bytes::Bytes;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Option<Bytes>),
    Array(Option<Vec<Reply>>),
}

impl Reply {
    pub fn is_ok(&self) -> bool {
        matches!(self, Reply::Simple(s) if s.eq_ignore_ascii_case("OK"))
    }
}

/// One parsed command frame plus the exact bytes it was read from, so a
/// forwarder can pass it through byte-for-byte instead of re-encoding it.
#[derive(Debug, Clone)]
pub struct CommandFrame {
    pub args: Vec<Bytes>,
    pub raw: Bytes,
}

impl CommandFrame {
    pub fn first_word_upper(&self) -> Vec<u8> {
        self.args
            .first()
            .map(|b| b.to_ascii_uppercase())
            .unwrap_or_default()
    }
}

fn protocol_err(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

pub fn encode_command<I, B>(args: I) -> Vec<u8>
where
    I: IntoIterator<Item = B>,
    B: AsRef<[u8]>,
{
    let items: Vec<B> = args.into_iter().collect();
    let mut out = Vec::new();
    out.extend_from_slice(format!("*{}\r\n", items.len()).as_bytes());
    for item in &items {
        let bytes = item.as_ref();
        out.extend_from_slice(format!("${}\r\n", bytes.len()).as_bytes());
        out.extend_from_slice(bytes);
        out.extend_from_slice(b"\r\n");
    }
    out
}

pub async fn write_command<W, I, B>(w: &mut W, args: I) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    I: IntoIterator<Item = B>,
    B: AsRef<[u8]>,
{
    w.write_all(&encode_command(args)).await
}

async fn read_line_trimmed<R: AsyncBufRead + Unpin>(r: &mut R) -> io::Result<String> {
    let mut line = String::new();
    let n = r.read_line(&mut line).await?;
    if n == 0 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed"));
    }
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Ok(line)
}

/// Read one reply. Boxed because `Array` replies recurse into this same
/// function for each element.
pub fn read_reply<'a, R>(r: &'a mut R) -> Pin<Box<dyn Future<Output = io::Result<Reply>> + Send + 'a>>
where
    R: AsyncBufRead + Unpin + Send,
{
    Box::pin(async move {
        let line = read_line_trimmed(r).await?;
        let (tag, rest) = line.split_at(1);
        match tag {
            "+" => Ok(Reply::Simple(rest.to_string())),
            "-" => Ok(Reply::Error(rest.to_string())),
            ":" => rest
                .parse()
                .map(Reply::Integer)
                .map_err(|_| protocol_err(format!("bad integer reply {rest:?}"))),
            "$" => {
                let n: i64 = rest
                    .parse()
                    .map_err(|_| protocol_err(format!("bad bulk length {rest:?}")))?;
                if n < 0 {
                    return Ok(Reply::Bulk(None));
                }
                let mut buf = vec![0u8; n as usize + 2];
                r.read_exact(&mut buf).await?;
                buf.truncate(n as usize);
                Ok(Reply::Bulk(Some(Bytes::from(buf))))
            }
            "*" => {
                let n: i64 = rest
                    .parse()
                    .map_err(|_| protocol_err(format!("bad array length {rest:?}")))?;
                if n < 0 {
                    return Ok(Reply::Array(None));
                }
                let mut items = Vec::with_capacity(n as usize);
                for _ in 0..n {
                    items.push(read_reply(r).await?);
                }
                Ok(Reply::Array(Some(items)))
            }
            other => Err(protocol_err(format!("unexpected reply tag {other:?}"))),
        }
    })
}

async fn read_raw_line<R: AsyncBufRead + Unpin>(
    r: &mut R,
    raw: &mut Vec<u8>,
) -> io::Result<Option<String>> {
    let mut line = Vec::new();
    let n = r.read_until(b'\n', &mut line).await?;
    if n == 0 {
        return Ok(None);
    }
    raw.extend_from_slice(&line);
    while line.last() == Some(&b'\n') || line.last() == Some(&b'\r') {
        line.pop();
    }
    String::from_utf8(line)
        .map(Some)
        .map_err(|_| protocol_err("non-utf8 command header"))
}

/// Read one RESP array-of-bulk-strings command frame, returning `None` on a
/// clean EOF at a frame boundary. Used by the backlog forwarder, which
/// forwards `raw` verbatim so its byte accounting matches what the master
/// actually sent.
pub async fn read_command_frame<R: AsyncBufRead + Unpin>(
    r: &mut R,
) -> io::Result<Option<CommandFrame>> {
    let mut raw = Vec::new();
    let Some(header) = read_raw_line(r, &mut raw).await? else {
        return Ok(None);
    };
    if !header.starts_with('*') {
        return Err(protocol_err(format!("expected array header, got {header:?}")));
    }
    let n: usize = header[1..]
        .parse()
        .map_err(|_| protocol_err(format!("bad array length {header:?}")))?;
    let mut args = Vec::with_capacity(n);
    for _ in 0..n {
        let bulk_header = read_raw_line(r, &mut raw)
            .await?
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "truncated command frame"))?;
        if !bulk_header.starts_with('$') {
            return Err(protocol_err(format!("expected bulk header, got {bulk_header:?}")));
        }
        let len: usize = bulk_header[1..]
            .parse()
            .map_err(|_| protocol_err(format!("bad bulk length {bulk_header:?}")))?;
        let mut buf = vec![0u8; len + 2];
        r.read_exact(&mut buf).await?;
        raw.extend_from_slice(&buf);
        buf.truncate(len);
        args.push(Bytes::from(buf));
    }
    Ok(Some(CommandFrame {
        args,
        raw: Bytes::from(raw),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::BufReader;

    #[test]
    fn encodes_command_as_resp_array() {
        let out = encode_command([b"SET".as_slice(), b"k", b"v"]);
        assert_eq!(out, b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n");
    }

    #[tokio::test]
    async fn reads_simple_and_error_replies() {
        let mut r = BufReader::new(Cursor::new(b"+OK\r\n-ERR oops\r\n".to_vec()));
        assert_eq!(read_reply(&mut r).await.unwrap(), Reply::Simple("OK".into()));
        assert_eq!(read_reply(&mut r).await.unwrap(), Reply::Error("ERR oops".into()));
    }

    #[tokio::test]
    async fn reads_nested_array_reply() {
        let mut r = BufReader::new(Cursor::new(
            b"*2\r\n$3\r\nfoo\r\n*1\r\n:42\r\n".to_vec(),
        ));
        let reply = read_reply(&mut r).await.unwrap();
        match reply {
            Reply::Array(Some(items)) => {
                assert_eq!(items[0], Reply::Bulk(Some(Bytes::from_static(b"foo"))));
                assert_eq!(items[1], Reply::Array(Some(vec![Reply::Integer(42)])));
            }
            _ => panic!("expected array"),
        }
    }

    #[tokio::test]
    async fn reads_command_frame_with_exact_raw_bytes() {
        let raw = b"*2\r\n$6\r\nSELECT\r\n$1\r\n3\r\n".to_vec();
        let mut r = BufReader::new(Cursor::new(raw.clone()));
        let frame = read_command_frame(&mut r).await.unwrap().unwrap();
        assert_eq!(frame.args[0], Bytes::from_static(b"SELECT"));
        assert_eq!(frame.args[1], Bytes::from_static(b"3"));
        assert_eq!(&frame.raw[..], &raw[..]);
    }

    #[tokio::test]
    async fn command_frame_eof_at_boundary_is_none() {
        let mut r = BufReader::new(Cursor::new(Vec::new()));
        assert!(read_command_frame(&mut r).await.unwrap().is_none());
    }
}
