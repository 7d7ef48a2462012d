//! Passive-mode data channel

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

use crate::config::FtpClientConfig;
use crate::control::ControlChannel;
use crate::error::{FtpError, Result};
use crate::reply::parse_passive_port;

/// Request a passive data port and connect to it
pub(crate) async fn open_passive(
    control: &mut ControlChannel,
    config: &FtpClientConfig,
) -> Result<TcpStream> {
    let reply = control.command("PASV").await?;
    if reply.is_negative() {
        return Err(FtpError::rejected("PASV", reply));
    }
    let port = parse_passive_port(&reply)?;
    let addr = SocketAddr::new(control.peer().ip(), port);
    debug!(%addr, "Opening passive data connection");

    tokio::time::timeout(config.connect_timeout(), TcpStream::connect(addr))
        .await
        .map_err(|_| FtpError::Timeout(format!("data connection to {}", addr)))?
        .map_err(|e| FtpError::PassiveMode(format!("connect to {}: {}", addr, e)))
}

/// Strip one trailing CRLF or LF
fn strip_terminator(line: &mut Vec<u8>) {
    if line.last() == Some(&b'\n') {
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
    }
}

/// Read an ASCII-mode transfer as text lines without terminators
pub(crate) async fn read_lines(data: TcpStream, idle: Duration) -> Result<Vec<String>> {
    let mut reader = BufReader::new(data);
    let mut lines = Vec::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let n = tokio::time::timeout(idle, reader.read_until(b'\n', &mut buf))
            .await
            .map_err(|_| FtpError::Timeout("data connection idle".into()))??;
        if n == 0 {
            break;
        }
        strip_terminator(&mut buf);
        lines.push(std::mem::take(&mut buf));
    }
    decode_lines(lines)
}

/// Decode raw lines as UTF-8; the whole transfer is read before this fails
pub(crate) fn decode_lines(lines: Vec<Vec<u8>>) -> Result<Vec<String>> {
    lines
        .into_iter()
        .enumerate()
        .map(|(index, line)| {
            String::from_utf8(line)
                .map_err(|_| FtpError::InvalidData(format!("line {} is not UTF-8", index + 1)))
        })
        .collect()
}

/// Write text lines in ASCII mode, each terminated by CRLF, then close the connection
pub(crate) async fn write_lines(
    mut data: TcpStream,
    lines: &[String],
    idle: Duration,
) -> Result<()> {
    for line in lines {
        let framed = format!("{}\r\n", line);
        tokio::time::timeout(idle, data.write_all(framed.as_bytes()))
            .await
            .map_err(|_| FtpError::Timeout("data connection idle".into()))??;
    }
    data.shutdown().await?;
    Ok(())
}

/// Stream an image-mode transfer into `sink`
pub(crate) async fn copy_to_sink(
    mut data: TcpStream,
    sink: &mut (dyn AsyncWrite + Unpin + Send),
    chunk_size: usize,
    idle: Duration,
) -> Result<u64> {
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut total = 0u64;
    loop {
        let n = tokio::time::timeout(idle, data.read(&mut buf))
            .await
            .map_err(|_| FtpError::Timeout("data connection idle".into()))??;
        if n == 0 {
            break;
        }
        sink.write_all(&buf[..n]).await.map_err(FtpError::Sink)?;
        total += n as u64;
    }
    sink.flush().await.map_err(FtpError::Sink)?;
    Ok(total)
}

/// Stream `source` over an image-mode transfer, then close the connection
pub(crate) async fn copy_from_source(
    mut data: TcpStream,
    source: &mut (dyn AsyncRead + Unpin + Send),
    chunk_size: usize,
    idle: Duration,
) -> Result<u64> {
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut total = 0u64;
    loop {
        let n = source.read(&mut buf).await.map_err(FtpError::Source)?;
        if n == 0 {
            break;
        }
        tokio::time::timeout(idle, data.write_all(&buf[..n]))
            .await
            .map_err(|_| FtpError::Timeout("data connection idle".into()))??;
        total += n as u64;
    }
    data.shutdown().await?;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_terminator() {
        let mut crlf = b"FEMC.EXE\r\n".to_vec();
        strip_terminator(&mut crlf);
        assert_eq!(crlf, b"FEMC.EXE");

        let mut lf = b"FEMC.EXE\n".to_vec();
        strip_terminator(&mut lf);
        assert_eq!(lf, b"FEMC.EXE");

        let mut bare = b"FEMC.EXE".to_vec();
        strip_terminator(&mut bare);
        assert_eq!(bare, b"FEMC.EXE");

        // A lone CR is content, not a terminator
        let mut cr = b"FEMC.EXE\r".to_vec();
        strip_terminator(&mut cr);
        assert_eq!(cr, b"FEMC.EXE\r");
    }

    #[tokio::test]
    async fn test_read_lines_over_socket() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(b"FIRST.EXE\r\nsecond\nlast").await.unwrap();
        });

        let data = TcpStream::connect(addr).await.unwrap();
        let lines = read_lines(data, Duration::from_secs(5)).await.unwrap();
        server.await.unwrap();

        assert_eq!(lines, vec!["FIRST.EXE", "second", "last"]);
    }

    #[tokio::test]
    async fn test_read_lines_rejects_invalid_utf8() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(b"FEMC.EXE\r\n\xff\xfe.EXE\r\n").await.unwrap();
        });

        let data = TcpStream::connect(addr).await.unwrap();
        let result = read_lines(data, Duration::from_secs(5)).await;
        server.await.unwrap();

        match result {
            Err(FtpError::InvalidData(msg)) => assert!(msg.contains("line 2"), "{}", msg),
            other => panic!("Expected InvalidData, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_copy_to_sink_counts_bytes() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let payload: Vec<u8> = (0..=255u8).cycle().take(40_000).collect();
        let expected = payload.clone();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(&payload).await.unwrap();
        });

        let data = TcpStream::connect(addr).await.unwrap();
        let mut sink = Vec::new();
        let n = copy_to_sink(data, &mut sink, 1024, Duration::from_secs(5))
            .await
            .unwrap();
        server.await.unwrap();

        assert_eq!(n, 40_000);
        assert_eq!(sink, expected);
    }
}
