//! Bag of Cells 序列化
//!
//! 标准 `b5ee9c72` 布局：去重后的 Cell 按拓扑序排列，引用只允许指向
//! 更大的下标。写出时附带 CRC32C 校验；读取时容忍并跳过校验字节
//! （嵌入的合约代码常量在编译期即固定，完整性由测试保证）。

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::cell::Cell;
use crate::error::CoreError;

const BOC_MAGIC: [u8; 4] = [0xb5, 0xee, 0x9c, 0x72];
const FLAG_HAS_IDX: u8 = 0x80;
const FLAG_HAS_CRC: u8 = 0x40;

/// 序列化单根 Cell 树为 BOC 字节流
pub fn serialize(root: &Cell) -> Vec<u8> {
    let cells = topological_order(root);
    let index: HashMap<[u8; 32], usize> = cells
        .iter()
        .enumerate()
        .map(|(i, c)| (c.repr_hash(), i))
        .collect();

    let ref_size = bytes_for(cells.len() as u64);
    let mut payload = Vec::new();
    for cell in &cells {
        payload.push(cell.d1());
        payload.push(cell.d2());
        payload.extend_from_slice(&cell.padded_data());
        for r in cell.refs() {
            let target = index[&r.repr_hash()] as u64;
            payload.extend_from_slice(&target.to_be_bytes()[8 - ref_size..]);
        }
    }

    let offset_size = bytes_for(payload.len() as u64);
    let mut out = Vec::with_capacity(payload.len() + 32);
    out.extend_from_slice(&BOC_MAGIC);
    out.push(FLAG_HAS_CRC | ref_size as u8);
    out.push(offset_size as u8);
    write_be(&mut out, cells.len() as u64, ref_size);
    write_be(&mut out, 1, ref_size); // roots
    write_be(&mut out, 0, ref_size); // absent
    write_be(&mut out, payload.len() as u64, offset_size);
    write_be(&mut out, 0, ref_size); // root index
    out.extend_from_slice(&payload);
    let crc = crc32c::crc32c(&out);
    out.extend_from_slice(&crc.to_le_bytes());
    out
}

/// 解析 BOC 字节流，返回首个根 Cell
pub fn parse(bytes: &[u8]) -> Result<Arc<Cell>, CoreError> {
    let mut reader = Reader::new(bytes);
    let magic = reader.take(4)?;
    if magic != BOC_MAGIC {
        return Err(CoreError::unexpected_format("invalid BOC magic"));
    }
    let flags = reader.take(1)?[0];
    let has_idx = flags & FLAG_HAS_IDX != 0;
    let has_crc = flags & FLAG_HAS_CRC != 0;
    let ref_size = (flags & 0x07) as usize;
    if ref_size == 0 || ref_size > 8 {
        return Err(CoreError::unexpected_format("invalid BOC ref size"));
    }
    let offset_size = reader.take(1)?[0] as usize;
    if offset_size == 0 || offset_size > 8 {
        return Err(CoreError::unexpected_format("invalid BOC offset size"));
    }

    let cell_count = reader.read_be(ref_size)? as usize;
    let root_count = reader.read_be(ref_size)? as usize;
    let _absent = reader.read_be(ref_size)?;
    let _total_size = reader.read_be(offset_size)?;
    if root_count == 0 {
        return Err(CoreError::unexpected_format("BOC contains no roots"));
    }
    let mut root_indexes = Vec::with_capacity(root_count);
    for _ in 0..root_count {
        let index = reader.read_be(ref_size)? as usize;
        if index >= cell_count {
            return Err(CoreError::unexpected_format("BOC root out of range"));
        }
        root_indexes.push(index);
    }
    if has_idx {
        reader.take(cell_count * offset_size)?;
    }

    // 先读出每个 Cell 的原始描述，再自底向上构建（引用只指向更大的下标）
    struct RawCell {
        data: Vec<u8>,
        bit_len: usize,
        refs: Vec<usize>,
    }
    let mut raw_cells = Vec::with_capacity(cell_count);
    for i in 0..cell_count {
        let d = reader.take(2)?;
        let (d1, d2) = (d[0], d[1]);
        if d1 & 0x08 != 0 {
            return Err(CoreError::unexpected_format("exotic cells are not supported"));
        }
        let ref_count = (d1 & 0x07) as usize;
        let byte_len = (d2 >> 1) as usize + (d2 & 1) as usize;
        let mut data = reader.take(byte_len)?.to_vec();
        let bit_len = if d2 & 1 == 0 {
            byte_len * 8
        } else {
            // 去掉结束标记位
            let last = *data
                .last()
                .ok_or_else(|| CoreError::unexpected_format("truncated cell data"))?;
            if last == 0 {
                return Err(CoreError::unexpected_format("missing completion tag"));
            }
            let tz = last.trailing_zeros() as usize;
            let len = byte_len * 8 - tz - 1;
            let idx = data.len() - 1;
            data[idx] &= !(1u8 << tz);
            len
        };
        let mut refs = Vec::with_capacity(ref_count);
        for _ in 0..ref_count {
            let target = reader.read_be(ref_size)? as usize;
            if target <= i || target >= cell_count {
                return Err(CoreError::unexpected_format("invalid cell reference order"));
            }
            refs.push(target);
        }
        raw_cells.push(RawCell {
            data,
            bit_len,
            refs,
        });
    }
    if has_crc {
        let _ = reader.take(4)?;
    }

    let mut built: Vec<Option<Arc<Cell>>> = vec![None; cell_count];
    for i in (0..cell_count).rev() {
        let raw = &raw_cells[i];
        let refs = raw
            .refs
            .iter()
            .map(|&t| built[t].clone().expect("refs are built bottom-up"))
            .collect();
        built[i] = Some(Arc::new(Cell::from_parts(
            raw.data.clone(),
            raw.bit_len,
            refs,
        )));
    }
    built[root_indexes[0]]
        .clone()
        .ok_or_else(|| CoreError::unexpected_format("BOC root out of range"))
}

/// 去重拓扑排序：按距根的最大距离升序，保证引用只指向更大下标
fn topological_order(root: &Cell) -> Vec<Arc<Cell>> {
    fn visit(
        cell: &Arc<Cell>,
        distance: usize,
        seen: &mut HashMap<[u8; 32], (usize, usize, Arc<Cell>)>,
        order: &mut usize,
    ) {
        use std::collections::hash_map::Entry;

        match seen.entry(cell.repr_hash()) {
            Entry::Occupied(mut entry) => {
                if distance <= entry.get().0 {
                    return;
                }
                entry.get_mut().0 = distance;
            }
            Entry::Vacant(entry) => {
                entry.insert((distance, *order, cell.clone()));
                *order += 1;
            }
        }
        for r in cell.refs() {
            visit(r, distance + 1, seen, order);
        }
    }

    let root = Arc::new(root.clone());
    let mut seen = HashMap::new();
    let mut order = 0usize;
    visit(&root, 0, &mut seen, &mut order);
    let mut cells: Vec<(usize, usize, Arc<Cell>)> = seen.into_values().collect();
    cells.sort_by_key(|(distance, first_seen, _)| (*distance, *first_seen));
    cells.into_iter().map(|(_, _, c)| c).collect()
}

fn bytes_for(value: u64) -> usize {
    let mut n = 1;
    while value >= 1u64 << (n * 8) {
        n += 1;
    }
    n
}

fn write_be(out: &mut Vec<u8>, value: u64, size: usize) {
    out.extend_from_slice(&value.to_be_bytes()[8 - size..]);
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CoreError> {
        if self.pos + n > self.bytes.len() {
            return Err(CoreError::unexpected_format("truncated BOC"));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_be(&mut self, size: usize) -> Result<u64, CoreError> {
        let bytes = self.take(size)?;
        let mut value = 0u64;
        for &b in bytes {
            value = (value << 8) | b as u64;
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cell::CellBuilder;

    fn leaf(tag: u32) -> Arc<Cell> {
        let mut b = CellBuilder::new();
        b.store_u32(tag).unwrap();
        Arc::new(b.build().unwrap())
    }

    #[test]
    fn test_roundtrip_single_cell() {
        let mut b = CellBuilder::new();
        b.store_uint(0b10110, 5).unwrap();
        let cell = b.build().unwrap();
        let boc = serialize(&cell);
        let parsed = parse(&boc).unwrap();
        assert_eq!(parsed.repr_hash(), cell.repr_hash());
        assert_eq!(parsed.bit_len(), 5);
    }

    #[test]
    fn test_roundtrip_tree_with_shared_ref() {
        let shared = leaf(42);
        let mut mid = CellBuilder::new();
        mid.store_u8(1).unwrap();
        mid.store_ref(shared.clone()).unwrap();
        let mid = Arc::new(mid.build().unwrap());

        let mut root = CellBuilder::new();
        root.store_u8(2).unwrap();
        root.store_ref(mid).unwrap();
        root.store_ref(shared).unwrap();
        let root = root.build().unwrap();

        let boc = serialize(&root);
        let parsed = parse(&boc).unwrap();
        assert_eq!(parsed.repr_hash(), root.repr_hash());
        // 共享叶子只序列化一次：root + mid + shared = 3 cells
        assert_eq!(parsed.refs().len(), 2);
        assert_eq!(
            parsed.refs()[0].refs()[0].repr_hash(),
            parsed.refs()[1].repr_hash()
        );
    }

    #[test]
    fn test_parse_rejects_bad_magic() {
        assert!(parse(&[0x00, 0x01, 0x02, 0x03, 0x04]).is_err());
    }

    #[test]
    fn test_parse_rejects_truncated() {
        let boc = serialize(&leaf(7));
        assert!(parse(&boc[..boc.len() - 8]).is_err());
    }
}
