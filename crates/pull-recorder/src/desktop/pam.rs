//! Reader for a stream of PAM (`P7`) images, as written by ffmpeg's
//! `image2pipe` muxer with the `pam` encoder.

use pull_recorder_core::capture::RawFrame;

use std::io::{Error, ErrorKind, Result};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// Parsed PAM header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PamHeader {
    /// Image width.
    pub width: u32,
    /// Image height.
    pub height: u32,
    /// Samples per pixel: 3 (RGB) or 4 (RGBA).
    pub depth: u32,
}

impl PamHeader {
    /// Size of the pixel payload following the header.
    pub fn payload_len(&self) -> usize {
        self.width as usize * self.height as usize * self.depth as usize
    }
}

/// Parse the header lines between `P7` and `ENDHDR`.
pub fn parse_pam_header<'a>(lines: impl IntoIterator<Item = &'a str>) -> Result<PamHeader> {
    let (mut width, mut height, mut depth, mut maxval) = (None, None, None, None);

    for line in lines {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let number = || value.trim().parse::<u32>().map_err(|e| invalid(format!("{}: {}", key, e)));
        match key {
            "WIDTH" => width = Some(number()?),
            "HEIGHT" => height = Some(number()?),
            "DEPTH" => depth = Some(number()?),
            "MAXVAL" => maxval = Some(number()?),
            _ => {}
        }
    }

    let header = PamHeader {
        width: width.ok_or_else(|| invalid("missing WIDTH"))?,
        height: height.ok_or_else(|| invalid("missing HEIGHT"))?,
        depth: depth.ok_or_else(|| invalid("missing DEPTH"))?,
    };

    if maxval.is_some_and(|m| m != 255) {
        return Err(invalid("only 8-bit PAM is supported"));
    }
    if !matches!(header.depth, 3 | 4) || header.width == 0 || header.height == 0 {
        return Err(invalid(format!("unsupported PAM {:?}", header)));
    }

    Ok(header)
}

/// Read the next image, or `None` at a clean end of stream.
pub async fn read_pam_frame<R>(reader: &mut R) -> Result<Option<RawFrame>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Ok(None);
    }
    if line.trim() != "P7" {
        return Err(invalid(format!("expected P7 magic, got {:?}", line.trim())));
    }

    let mut header_lines = Vec::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Err(Error::new(ErrorKind::UnexpectedEof, "truncated PAM header"));
        }
        if line.trim() == "ENDHDR" {
            break;
        }
        header_lines.push(line.clone());
    }

    let header = parse_pam_header(header_lines.iter().map(String::as_str))?;
    let mut payload = vec![0u8; header.payload_len()];
    reader.read_exact(&mut payload).await?;

    let rgba = if header.depth == 4 {
        payload
    } else {
        payload
            .chunks_exact(3)
            .flat_map(|px| [px[0], px[1], px[2], 255])
            .collect()
    };

    Ok(Some(RawFrame {
        rgba,
        width: header.width,
        height: header.height,
    }))
}

fn invalid(reason: impl Into<String>) -> Error {
    Error::new(ErrorKind::InvalidData, reason.into())
}
