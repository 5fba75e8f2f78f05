use std::sync::Arc;

use neon_sim::drivers::devices::W25QxxFlash;
use neon_sim::drivers::devices::w25qxx::{PAGE_SIZE, SECTOR_SIZE};
use neon_sim::drivers::{NO_TOKEN, SlaveDevice, SlaveLink, SlavePeripheral};
use neon_sim::kernel::{SimBuilder, SimContext};

const CS: u8 = 10;
const BUS: usize = 0;

/// 收到 0xA0 后请求 4 个字节
#[derive(Default)]
struct Framer {
    deliveries: Vec<(u8, Vec<u8>)>,
}

impl SlaveDevice for Framer {
    fn on_byte_received(&mut self, link: &mut SlaveLink, byte: u8) {
        if link.current_token() == NO_TOKEN && byte == 0xA0 {
            link.set_requested_data_size(0xA0, 4);
        }
    }

    fn on_requested_data_received(&mut self, link: &mut SlaveLink, token: u8, data: &[u8]) {
        self.deliveries.push((token, data.to_vec()));
        link.clear_current_token();
    }
}

fn select(ctx: &SimContext) {
    ctx.gpio().set(ctx, CS, 0);
}

fn deselect(ctx: &SimContext) {
    ctx.gpio().set(ctx, CS, 1);
}

fn setup<D: SlaveDevice>(device: D) -> (SimContext, Arc<SlavePeripheral<D>>) {
    let ctx = SimBuilder::new().build().unwrap();
    deselect(&ctx);
    let peripheral = SlavePeripheral::attach(&ctx, BUS, CS, device).unwrap();
    (ctx, peripheral)
}

#[test]
fn test_exact_request_delivered_once() {
    let (ctx, framer) = setup(Framer::default());
    let bus = ctx.spi_bus(BUS).unwrap();

    select(&ctx);
    bus.transfer_bytes(&ctx, Some(&[0xA0, 1, 2, 3, 4]), None);
    deselect(&ctx);

    framer.with_device(|d| {
        assert_eq!(d.deliveries, vec![(0xA0, vec![1, 2, 3, 4])]);
    });
}

#[test]
fn test_short_request_flushed_at_deselect() {
    let (ctx, framer) = setup(Framer::default());
    let bus = ctx.spi_bus(BUS).unwrap();

    select(&ctx);
    bus.write(&ctx, 0xA0);
    bus.write(&ctx, 9);
    bus.write(&ctx, 8);
    framer.with_device(|d| assert!(d.deliveries.is_empty()));
    deselect(&ctx);

    framer.with_device(|d| {
        assert_eq!(d.deliveries, vec![(0xA0, vec![9, 8])]);
    });
    // 再次结束事务不会重复交付
    select(&ctx);
    deselect(&ctx);
    framer.with_device(|d| assert_eq!(d.deliveries.len(), 1));
}

#[test]
fn test_back_to_back_requests_in_one_transaction() {
    let (ctx, framer) = setup(Framer::default());
    let bus = ctx.spi_bus(BUS).unwrap();

    select(&ctx);
    bus.transfer_bytes(&ctx, Some(&[0xA0, 1, 1, 1, 1, 0xA0, 2, 2, 2, 2]), None);
    deselect(&ctx);

    framer.with_device(|d| {
        assert_eq!(d.deliveries.len(), 2);
        assert_eq!(d.deliveries[1].1, vec![2, 2, 2, 2]);
    });
}

#[test]
fn test_two_devices_share_a_bus() {
    let ctx = SimBuilder::new().build().unwrap();
    ctx.gpio().set(&ctx, 20, 1);
    ctx.gpio().set(&ctx, 21, 1);
    let first = SlavePeripheral::attach(&ctx, BUS, 20, Framer::default()).unwrap();
    let second = SlavePeripheral::attach(&ctx, BUS, 21, Framer::default()).unwrap();
    let bus = ctx.spi_bus(BUS).unwrap();

    ctx.gpio().set(&ctx, 21, 0);
    bus.transfer_bytes(&ctx, Some(&[0xA0, 5, 6, 7, 8]), None);
    ctx.gpio().set(&ctx, 21, 1);

    first.with_device(|d| assert!(d.deliveries.is_empty()));
    second.with_device(|d| assert_eq!(d.deliveries.len(), 1));
    assert_eq!(bus.contention_count(), 0);
}

#[test]
fn test_overlapping_selects_counted_as_contention() {
    let ctx = SimBuilder::new().build().unwrap();
    ctx.gpio().set(&ctx, 20, 1);
    ctx.gpio().set(&ctx, 21, 1);
    let _first = SlavePeripheral::attach(&ctx, BUS, 20, Framer::default()).unwrap();
    let _second = SlavePeripheral::attach(&ctx, BUS, 21, Framer::default()).unwrap();

    ctx.gpio().set(&ctx, 20, 0);
    ctx.gpio().set(&ctx, 21, 0);

    assert_eq!(ctx.spi_bus(BUS).unwrap().contention_count(), 1);
}

// ============================================================================
// SPI Flash
// ============================================================================

fn flash_command(ctx: &SimContext, command: &[u8], payload: &[u8], read: &mut [u8]) {
    let bus = ctx.spi_bus(BUS).unwrap();
    select(ctx);
    bus.transfer_bytes(ctx, Some(command), None);
    if !payload.is_empty() {
        bus.transfer_bytes(ctx, Some(payload), None);
    }
    if !read.is_empty() {
        bus.transfer_bytes(ctx, None, Some(read));
    }
    deselect(ctx);
}

#[test]
fn test_flash_program_and_read_back() {
    let (ctx, flash) = setup(W25QxxFlash::new(4 * SECTOR_SIZE));

    flash_command(&ctx, &[0x06], &[], &mut []);
    flash_command(&ctx, &[0x02, 0x00, 0x02, 0x10], b"hello", &mut []);

    let mut read = [0u8; 7];
    flash_command(&ctx, &[0x03, 0x00, 0x02, 0x10], &[], &mut read);
    assert_eq!(&read[..5], b"hello");
    assert_eq!(&read[5..], &[0xFF, 0xFF]);
    flash.with_device(|f| assert_eq!(&f.contents()[0x210..0x215], b"hello"));
}

#[test]
fn test_flash_read_streams_across_pages() {
    let (ctx, flash) = setup(W25QxxFlash::new(4 * SECTOR_SIZE));
    let page: Vec<u8> = (0..PAGE_SIZE).map(|i| i as u8).collect();
    flash_command(&ctx, &[0x02, 0x00, 0x00, 0x00], &page, &mut []);
    flash_command(&ctx, &[0x02, 0x00, 0x01, 0x00], &[0xAB; 16], &mut []);

    let mut read = vec![0u8; PAGE_SIZE + 16];
    flash_command(&ctx, &[0x03, 0x00, 0x00, 0x00], &[], &mut read);
    assert_eq!(&read[..PAGE_SIZE], page.as_slice());
    assert!(read[PAGE_SIZE..].iter().all(|b| *b == 0xAB));
    assert!(!flash.is_inside_transaction());
}

#[test]
fn test_flash_status_and_erase() {
    let (ctx, flash) = setup(W25QxxFlash::new(4 * SECTOR_SIZE));
    flash_command(&ctx, &[0x02, 0x00, 0x10, 0x00], &[0x00; 8], &mut []);

    let mut status = [0xAAu8; 1];
    flash_command(&ctx, &[0x05], &[], &mut status);
    assert_eq!(status[0], 0x00);

    flash_command(&ctx, &[0x20, 0x00, 0x10, 0x20], &[], &mut []);
    flash.with_device(|f| {
        assert!(f.contents()[0x1000..0x2000].iter().all(|b| *b == 0xFF));
    });
}
