//! Byte-level serialization primitives.
//!
//! Every operation copies a value in/out of a caller-owned buffer at an
//! explicit offset and returns the number of bytes it advanced. The codec
//! never bounds-checks the destination/source buffer - callers must size
//! buffers to fit.
//!
//! All primitives are little-endian and unaligned.

use crate::error::{ErrorType, NetworkError, NetworkResult};
use byteorder::{ByteOrder, LittleEndian};

pub const BOOL_VECTOR_MAX: usize = 64;

macro_rules! copy_in_primitive {
    ($name:ident, $ty:ty, $write:ident) => {
        #[inline]
        pub fn $name(data: &mut [u8], position: usize, value: $ty) -> usize {
            LittleEndian::$write(&mut data[position..position + ::std::mem::size_of::<$ty>()], value);
            ::std::mem::size_of::<$ty>()
        }
    };
}

macro_rules! copy_out_primitive {
    ($name:ident, $ty:ty, $read:ident) => {
        #[inline]
        pub fn $name(data: &[u8], position: usize) -> ($ty, usize) {
            let value = LittleEndian::$read(&data[position..position + ::std::mem::size_of::<$ty>()]);
            (value, ::std::mem::size_of::<$ty>())
        }
    };
}

copy_in_primitive!(write_u16, u16, write_u16);
copy_in_primitive!(write_i16, i16, write_i16);
copy_in_primitive!(write_u32, u32, write_u32);
copy_in_primitive!(write_i32, i32, write_i32);
copy_in_primitive!(write_u64, u64, write_u64);
copy_in_primitive!(write_i64, i64, write_i64);
copy_in_primitive!(write_f32, f32, write_f32);
copy_in_primitive!(write_f64, f64, write_f64);

copy_out_primitive!(read_u16, u16, read_u16);
copy_out_primitive!(read_i16, i16, read_i16);
copy_out_primitive!(read_u32, u32, read_u32);
copy_out_primitive!(read_i32, i32, read_i32);
copy_out_primitive!(read_u64, u64, read_u64);
copy_out_primitive!(read_i64, i64, read_i64);
copy_out_primitive!(read_f32, f32, read_f32);
copy_out_primitive!(read_f64, f64, read_f64);

#[inline]
pub fn write_u8(data: &mut [u8], position: usize, value: u8) -> usize {
    data[position] = value;
    1
}

#[inline]
pub fn read_u8(data: &[u8], position: usize) -> (u8, usize) {
    (data[position], 1)
}

#[inline]
pub fn write_i8(data: &mut [u8], position: usize, value: i8) -> usize {
    data[position] = value as u8;
    1
}

#[inline]
pub fn read_i8(data: &[u8], position: usize) -> (i8, usize) {
    (data[position] as i8, 1)
}

#[inline]
pub fn write_bool(data: &mut [u8], position: usize, value: bool) -> usize {
    write_u8(data, position, value as u8)
}

#[inline]
pub fn read_bool(data: &[u8], position: usize) -> (bool, usize) {
    let (value, len) = read_u8(data, position);
    (value != 0, len)
}

/// Copies a fixed-length array of a primitive type with no framing: exactly
/// `array.len() * sizeof(T)` bytes.
#[inline]
pub fn write_array(data: &mut [u8], position: usize, array: &[u8]) -> usize {
    data[position..position + array.len()].copy_from_slice(array);
    array.len()
}

#[inline]
pub fn read_array(data: &[u8], position: usize, out: &mut [u8]) -> usize {
    out.copy_from_slice(&data[position..position + out.len()]);
    out.len()
}

/// Length-prefixed byte string: a 32-bit length followed by that many bytes.
/// A length of zero is valid and writes only the prefix.
#[inline]
pub fn write_bytes(data: &mut [u8], position: usize, bytes: &[u8]) -> usize {
    let mut pos = write_u32(data, position, bytes.len() as u32);
    pos += write_array(data, position + pos, bytes);
    pos
}

#[inline]
pub fn read_bytes(data: &[u8], position: usize) -> (Vec<u8>, usize) {
    let (len, mut pos) = read_u32(data, position);
    let len = len as usize;
    let mut out = vec![0u8; len];
    if len > 0 {
        pos += read_array(data, position + pos, &mut out);
    }
    (out, pos)
}

/// Packed bit-vector: an 8-bit count (<= 64) followed by `ceil(count/8)`
/// bytes, bits packed LSB-first within each byte.
pub fn write_bitvec(data: &mut [u8], position: usize, bools: &[bool]) -> NetworkResult<usize> {
    if bools.len() > BOOL_VECTOR_MAX {
        return Err(NetworkError::Fatal(ErrorType::OutOfRange));
    }

    let mut pos = write_u8(data, position, bools.len() as u8);

    let packed_len = (bools.len() + 7) / 8;
    let mut packed = [0u8; (BOOL_VECTOR_MAX + 7) / 8];
    for (i, &bit) in bools.iter().enumerate() {
        if bit {
            packed[i / 8] |= 1 << (i % 8);
        }
    }

    pos += write_array(data, position + pos, &packed[..packed_len]);
    Ok(pos)
}

pub fn read_bitvec(data: &[u8], position: usize) -> NetworkResult<(Vec<bool>, usize)> {
    let (count, mut pos) = read_u8(data, position);
    let count = count as usize;
    if count > BOOL_VECTOR_MAX {
        return Err(NetworkError::Fatal(ErrorType::OutOfRange));
    }

    let packed_len = (count + 7) / 8;
    let mut packed = [0u8; (BOOL_VECTOR_MAX + 7) / 8];
    pos += read_array(data, position + pos, &mut packed[..packed_len]);

    let mut bools = Vec::with_capacity(count);
    for i in 0..count {
        bools.push(packed[i / 8] & (1 << (i % 8)) != 0);
    }

    Ok((bools, pos))
}

/// Capacity-aware sequential writer over a caller-owned buffer.
///
/// The free functions above take an explicit offset and never bounds-check;
/// `Writer` is the convenience layer for call sites that want to lay out a
/// handful of fields back-to-back without tracking a running position by
/// hand, checking capacity upfront the way `flux::shared`'s `SizedWrite`
/// does. Both layers encode the same wire formats - `Writer` is built on top
/// of the free functions, not a second implementation of them.
pub struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    pub fn new(buf: &'a mut [u8]) -> Writer<'a> {
        Writer { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn free_capacity(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn require(&self, needed: usize) -> NetworkResult<()> {
        if self.free_capacity() < needed {
            return Err(NetworkError::Wait);
        }
        Ok(())
    }
}

macro_rules! writer_primitive {
    ($name:ident, $ty:ty, $write_fn:ident) => {
        impl<'a> Writer<'a> {
            pub fn $name(&mut self, value: $ty) -> NetworkResult<()> {
                self.require(::std::mem::size_of::<$ty>())?;
                self.pos += $write_fn(self.buf, self.pos, value);
                Ok(())
            }
        }
    };
}

writer_primitive!(write_u8, u8, write_u8);
writer_primitive!(write_i8, i8, write_i8);
writer_primitive!(write_u16, u16, write_u16);
writer_primitive!(write_i16, i16, write_i16);
writer_primitive!(write_u32, u32, write_u32);
writer_primitive!(write_i32, i32, write_i32);
writer_primitive!(write_u64, u64, write_u64);
writer_primitive!(write_i64, i64, write_i64);
writer_primitive!(write_f32, f32, write_f32);
writer_primitive!(write_f64, f64, write_f64);
writer_primitive!(write_bool, bool, write_bool);

impl<'a> Writer<'a> {
    pub fn write_bytes(&mut self, bytes: &[u8]) -> NetworkResult<()> {
        self.require(4 + bytes.len())?;
        self.pos += write_bytes(self.buf, self.pos, bytes);
        Ok(())
    }

    pub fn write_bitvec(&mut self, bools: &[bool]) -> NetworkResult<()> {
        self.require(1 + (bools.len() + 7) / 8)?;
        self.pos += write_bitvec(self.buf, self.pos, bools)?;
        Ok(())
    }
}

/// Capacity-aware sequential reader, the read-side counterpart to `Writer`.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Reader<'a> {
        Reader { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining_data(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn require(&self, needed: usize) -> NetworkResult<()> {
        if self.remaining_data() < needed {
            return Err(NetworkError::Fatal(ErrorType::Malformed));
        }
        Ok(())
    }
}

macro_rules! reader_primitive {
    ($name:ident, $ty:ty, $read_fn:ident) => {
        impl<'a> Reader<'a> {
            pub fn $name(&mut self) -> NetworkResult<$ty> {
                self.require(::std::mem::size_of::<$ty>())?;
                let (value, len) = $read_fn(self.buf, self.pos);
                self.pos += len;
                Ok(value)
            }
        }
    };
}

reader_primitive!(read_u8, u8, read_u8);
reader_primitive!(read_i8, i8, read_i8);
reader_primitive!(read_u16, u16, read_u16);
reader_primitive!(read_i16, i16, read_i16);
reader_primitive!(read_u32, u32, read_u32);
reader_primitive!(read_i32, i32, read_i32);
reader_primitive!(read_u64, u64, read_u64);
reader_primitive!(read_i64, i64, read_i64);
reader_primitive!(read_f32, f32, read_f32);
reader_primitive!(read_f64, f64, read_f64);
reader_primitive!(read_bool, bool, read_bool);

impl<'a> Reader<'a> {
    pub fn read_bytes(&mut self) -> NetworkResult<Vec<u8>> {
        self.require(4)?;
        let (bytes, len) = read_bytes(self.buf, self.pos);
        self.pos += len;
        Ok(bytes)
    }

    pub fn read_bitvec(&mut self) -> NetworkResult<Vec<bool>> {
        self.require(1)?;
        let (bools, len) = read_bitvec(self.buf, self.pos)?;
        self.pos += len;
        Ok(bools)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_roundtrip() {
        let mut buf = [0u8; 8];

        write_u64(&mut buf, 0, 0x0102_0304_0506_0708);
        assert_eq!(read_u64(&buf, 0), (0x0102_0304_0506_0708, 8));

        write_i64(&mut buf, 0, -12345);
        assert_eq!(read_i64(&buf, 0), (-12345, 8));

        write_f64(&mut buf, 0, 3.5);
        assert_eq!(read_f64(&buf, 0), (3.5, 8));

        write_bool(&mut buf, 0, true);
        assert_eq!(read_bool(&buf, 0), (true, 1));

        write_bool(&mut buf, 0, false);
        assert_eq!(read_bool(&buf, 0), (false, 1));
    }

    #[test]
    fn test_bytes_roundtrip_including_empty() {
        let mut buf = [0u8; 32];

        let len = write_bytes(&mut buf, 0, b"hello");
        let (out, read_len) = read_bytes(&buf, 0);
        assert_eq!(out, b"hello");
        assert_eq!(len, read_len);

        let len = write_bytes(&mut buf, 0, b"");
        let (out, read_len) = read_bytes(&buf, 0);
        assert_eq!(out, Vec::<u8>::new());
        assert_eq!(len, read_len);
        assert_eq!(len, 4);
    }

    #[test]
    fn test_bitvec_roundtrip() {
        for len in 0..=BOOL_VECTOR_MAX {
            let bools: Vec<bool> = (0..len).map(|i| i % 3 == 0).collect();
            let mut buf = [0u8; 16];

            let written = write_bitvec(&mut buf, 0, &bools).unwrap();
            let (out, read_len) = read_bitvec(&buf, 0).unwrap();

            assert_eq!(out, bools);
            assert_eq!(written, read_len);
        }
    }

    #[test]
    fn test_bitvec_over_max_is_out_of_range() {
        let bools = vec![true; BOOL_VECTOR_MAX + 1];
        let mut buf = [0u8; 16];

        assert_eq!(
            write_bitvec(&mut buf, 0, &bools),
            Err(NetworkError::Fatal(ErrorType::OutOfRange))
        );
    }

    #[test]
    fn test_writer_reader_roundtrip_sequential_fields() {
        let mut buf = [0u8; 64];
        let mut writer = Writer::new(&mut buf);

        writer.write_u32(7).unwrap();
        writer.write_bool(true).unwrap();
        writer.write_bytes(b"hello").unwrap();
        writer.write_i64(-99).unwrap();
        let written = writer.position();

        let mut reader = Reader::new(&buf[..written]);
        assert_eq!(reader.read_u32().unwrap(), 7);
        assert_eq!(reader.read_bool().unwrap(), true);
        assert_eq!(reader.read_bytes().unwrap(), b"hello".to_vec());
        assert_eq!(reader.read_i64().unwrap(), -99);
        assert_eq!(reader.remaining_data(), 0);
    }

    #[test]
    fn test_writer_out_of_capacity_is_wait() {
        let mut buf = [0u8; 2];
        let mut writer = Writer::new(&mut buf);

        assert_eq!(writer.write_u32(1), Err(NetworkError::Wait));
    }

    #[test]
    fn test_reader_past_end_is_malformed() {
        let buf = [0u8; 2];
        let mut reader = Reader::new(&buf);

        assert_eq!(
            reader.read_u32(),
            Err(NetworkError::Fatal(ErrorType::Malformed))
        );
    }
}
