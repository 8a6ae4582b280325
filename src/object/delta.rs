use crate::error::{Error, Result};

/// apply a git delta to `base`
///
/// the delta starts with the base and result sizes as little-endian
/// varints, followed by copy (high bit set) and insert commands.
pub fn apply_delta(base: &[u8], delta: &[u8]) -> Result<Vec<u8>> {
    let mut pos = 0;
    let base_size = read_size(delta, &mut pos)?;
    let result_size = read_size(delta, &mut pos)?;
    if base_size != base.len() {
        return Err(corrupt(format!(
            "base is {} bytes, delta expects {}",
            base.len(),
            base_size
        )));
    }

    // the declared size is untrusted; grow past this as commands land
    let mut out = Vec::with_capacity(result_size.min(base.len().saturating_add(delta.len())));
    while pos < delta.len() {
        let cmd = delta[pos];
        pos += 1;

        if cmd & 0x80 != 0 {
            let (offset, size) = copy_params(delta, &mut pos, cmd)?;
            let end = offset
                .checked_add(size)
                .filter(|&end| end <= base.len())
                .ok_or_else(|| corrupt("copy outside base".to_string()))?;
            out.extend_from_slice(&base[offset..end]);
        } else if cmd != 0 {
            let size = cmd as usize;
            let chunk = delta
                .get(pos..pos + size)
                .ok_or_else(|| corrupt("truncated insert".to_string()))?;
            out.extend_from_slice(chunk);
            pos += size;
        } else {
            return Err(corrupt("reserved command 0".to_string()));
        }

        if out.len() > result_size {
            return Err(corrupt("result larger than declared".to_string()));
        }
    }

    if out.len() != result_size {
        return Err(corrupt(format!(
            "result is {} bytes, delta declares {}",
            out.len(),
            result_size
        )));
    }
    Ok(out)
}

fn read_size(delta: &[u8], pos: &mut usize) -> Result<usize> {
    let mut value: usize = 0;
    let mut shift = 0;
    loop {
        let byte = *delta
            .get(*pos)
            .ok_or_else(|| corrupt("truncated size".to_string()))?;
        *pos += 1;
        if shift >= usize::BITS {
            return Err(corrupt("size overflow".to_string()));
        }
        value |= ((byte & 0x7f) as usize) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
}

// low four bits select offset bytes, next three select size bytes
fn copy_params(delta: &[u8], pos: &mut usize, cmd: u8) -> Result<(usize, usize)> {
    let mut offset = 0usize;
    for i in 0..4 {
        if cmd & (1 << i) != 0 {
            offset |= (next_byte(delta, pos)? as usize) << (8 * i);
        }
    }

    let mut size = 0usize;
    for i in 0..3 {
        if cmd & (0x10 << i) != 0 {
            size |= (next_byte(delta, pos)? as usize) << (8 * i);
        }
    }
    if size == 0 {
        size = 0x10000;
    }

    Ok((offset, size))
}

fn next_byte(delta: &[u8], pos: &mut usize) -> Result<u8> {
    let byte = *delta
        .get(*pos)
        .ok_or_else(|| corrupt("truncated copy command".to_string()))?;
    *pos += 1;
    Ok(byte)
}

fn corrupt(message: String) -> Error {
    Error::CorruptObjectMessage(format!("bad delta: {}", message))
}

#[cfg(test)]
pub(crate) fn encode_size(mut value: usize) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            return out;
        }
    }
}
