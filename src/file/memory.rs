use super::Backend;

/// Input container that was handed over as an owned buffer.
#[derive(Debug)]
pub struct Memory {
    data: Box<[u8]>,
}

impl Memory {
    /// Takes ownership of `data`; the buffer is never copied or resized afterwards.
    pub fn new(data: Vec<u8>) -> Memory {
        Memory {
            data: data.into_boxed_slice(),
        }
    }
}

impl Backend for Memory {
    fn data(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_slices_are_bounds_checked() {
        let mut data = b"dexsplt\0".to_vec();
        data.extend_from_slice(&[1, 0, 0, 0]);

        let memory = Memory::new(data);
        assert_eq!(memory.len(), 12);
        assert_eq!(memory.data_slice(0, 7).unwrap(), b"dexsplt");
        assert_eq!(memory.data_slice(8, 4).unwrap(), &[1, 0, 0, 0]);
        assert!(memory.data_slice(9, 4).is_err());
        assert!(memory.data_slice(usize::MAX, 2).is_err());
    }

    #[test]
    fn empty_buffer() {
        let memory = Memory::new(Vec::new());

        assert_eq!(memory.len(), 0);
        assert!(memory.data_slice(0, 0).unwrap().is_empty());
        assert!(memory.data_slice(0, 1).is_err());
    }
}
