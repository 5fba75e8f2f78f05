//! # W25Qxx SPI NOR Flash
//!
//! 内存中的 SPI Flash 模型，支持读、页编程与扇区/块擦除。
//!
//! | 指令 | 编码 | 说明 |
//! |------|------|------|
//! | Write Enable | 0x06 | 接受但不检查 |
//! | Read Status | 0x05 | 总是空闲 (0x00) |
//! | Read Data | 0x03 | 3 字节地址后连续读出，按页分块送出 |
//! | Page Program | 0x02 | 3 字节地址 + 最多 256 字节数据 |
//! | Sector Erase | 0x20 | 4 KiB |
//! | Block Erase | 0xD8 | 64 KiB |

use crate::drivers::slave::{NO_TOKEN, SlaveDevice, SlaveLink};

pub const CMD_WRITE_ENABLE: u8 = 0x06;
pub const CMD_READ_STATUS: u8 = 0x05;
pub const CMD_READ_DATA: u8 = 0x03;
pub const CMD_PAGE_PROGRAM: u8 = 0x02;
pub const CMD_SECTOR_ERASE: u8 = 0x20;
pub const CMD_BLOCK_ERASE: u8 = 0xD8;

pub const PAGE_SIZE: usize = 256;
pub const SECTOR_SIZE: usize = 4096;
pub const BLOCK_SIZE: usize = 65536;

const ADDRESS_BYTES: usize = 3;
const ERASED: u8 = 0xFF;

pub struct W25QxxFlash {
    data: Vec<u8>,
    /// 页编程的目标地址，收到地址后等待数据
    program_address: Option<usize>,
    /// 连续读的下一块起始地址
    read_cursor: Option<usize>,
}

impl W25QxxFlash {
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![ERASED; size],
            program_address: None,
            read_cursor: None,
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn contents(&self) -> &[u8] {
        &self.data
    }

    fn address(data: &[u8]) -> Option<usize> {
        match data {
            [a, b, c] => Some(usize::from(*a) << 16 | usize::from(*b) << 8 | usize::from(*c)),
            _ => None,
        }
    }

    /// 从 `address` 开始送出一页
    fn stream_from(&mut self, link: &mut SlaveLink, address: usize) {
        if address >= self.data.len() {
            self.read_cursor = None;
            return;
        }
        let end = (address + PAGE_SIZE).min(self.data.len());
        link.set_response(&self.data[address..end]);
        self.read_cursor = Some(end);
    }

    fn erase(&mut self, address: usize, span: usize) {
        let start = address - address % span;
        if start >= self.data.len() {
            tracing::warn!(address, "w25qxx erase out of range");
            return;
        }
        let end = (start + span).min(self.data.len());
        self.data[start..end].fill(ERASED);
    }

    fn program(&mut self, address: usize, bytes: &[u8]) {
        // 页内回绕
        let page = address - address % PAGE_SIZE;
        for (i, byte) in bytes.iter().enumerate() {
            let target = page + (address + i) % PAGE_SIZE;
            if let Some(cell) = self.data.get_mut(target) {
                // NOR 编程只能把 1 写成 0
                *cell &= *byte;
            }
        }
    }
}

impl SlaveDevice for W25QxxFlash {
    fn name(&self) -> &'static str {
        "w25qxx"
    }

    fn on_byte_received(&mut self, link: &mut SlaveLink, byte: u8) {
        if link.current_token() != NO_TOKEN {
            return;
        }
        match byte {
            CMD_PAGE_PROGRAM | CMD_READ_DATA | CMD_SECTOR_ERASE | CMD_BLOCK_ERASE => {
                link.set_requested_data_size(byte, ADDRESS_BYTES);
            }
            CMD_READ_STATUS => link.set_response_byte(0x00),
            CMD_WRITE_ENABLE => {}
            other => tracing::trace!(opcode = other, "w25qxx ignored opcode"),
        }
    }

    fn on_requested_data_received(&mut self, link: &mut SlaveLink, token: u8, data: &[u8]) {
        match token {
            CMD_READ_DATA => {
                if let Some(address) = Self::address(data) {
                    self.stream_from(link, address);
                }
            }
            CMD_PAGE_PROGRAM => match self.program_address.take() {
                Some(address) => self.program(address, data),
                None => {
                    if let Some(address) = Self::address(data) {
                        self.program_address = Some(address);
                        link.set_requested_data_size(CMD_PAGE_PROGRAM, PAGE_SIZE);
                    }
                }
            },
            CMD_SECTOR_ERASE => {
                if let Some(address) = Self::address(data) {
                    self.erase(address, SECTOR_SIZE);
                }
            }
            CMD_BLOCK_ERASE => {
                if let Some(address) = Self::address(data) {
                    self.erase(address, BLOCK_SIZE);
                }
            }
            _ => {}
        }
    }

    fn on_response_sent(&mut self, link: &mut SlaveLink) {
        if let Some(cursor) = self.read_cursor {
            self.stream_from(link, cursor);
        }
    }

    fn on_end_transaction(&mut self, _link: &mut SlaveLink) {
        self.read_cursor = None;
        self.program_address = None;
    }
}
