// 读取网络字节序的 u16 (端口号)
pub fn read_u16_be(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset.checked_add(2)?)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

// 从字节流中安全读取 u32
pub fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

pub fn read_u32_as_usize(data: &[u8], offset: usize) -> Option<usize> {
    read_u32(data, offset).map(|v| v as usize)
}

// 从字节流中安全读取 i32
pub fn read_i32(data: &[u8], offset: usize) -> Option<i32> {
    read_u32(data, offset).map(|v| v as i32)
}

// 从字节流中安全读取 u64
pub fn read_u64(data: &[u8], offset: usize) -> Option<u64> {
    let bytes = data.get(offset..offset.checked_add(8)?)?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    Some(u64::from_ne_bytes(buf))
}

// 读取定长字节数组 (IPv4/IPv6 地址)
pub fn read_array<const N: usize>(data: &[u8], offset: usize) -> Option<[u8; N]> {
    let bytes = data.get(offset..offset.checked_add(N)?)?;
    let mut buf = [0u8; N];
    buf.copy_from_slice(bytes);
    Some(buf)
}

// 按 8 字节对齐
pub fn round_up8(len: usize) -> usize {
    (len + 7) & !7
}

// 调用 `fill` 填充缓冲区; 返回值 (写入字节数) 占满缓冲区时加倍后重试
pub fn fill_growing<F>(initial: usize, mut fill: F) -> Option<Vec<u8>>
where
    F: FnMut(&mut [u8]) -> i32,
{
    let mut buf = vec![0u8; initial.max(1)];
    loop {
        let written = usize::try_from(fill(&mut buf)).ok().filter(|n| *n > 0)?;
        if written < buf.len() {
            buf.truncate(written);
            return Some(buf);
        }
        // 长度需要能作为 c_int 传给内核
        let len = buf.len().checked_mul(2).filter(|n| *n <= i32::MAX as usize)?;
        buf.resize(len, 0);
    }
}
