//! Consistency checks of an [`IpduMConfig`].
//!
//! The engine trusts every index once the configuration passed
//! [`IpduMConfig::validate`]; runtime code still accesses tables with `get()`
//! so a skipped validation degrades into rejected requests, never a panic.
use core::ops::Range;

use crate::core::{
    ByteOrder, Collection, HeaderSize, IpduMConfig, MuxRxPart, PartKind, RxLoTarget,
    RxProcessing, Segment, SelectorPattern, TxLoTarget, TxUpTarget,
};
use crate::error::ConfigError;
use crate::infra::codec::bits::byte_span;
use crate::infra::codec::header::{SHORT_HEADER_MAX_DLC, SHORT_HEADER_MAX_ID};
use crate::infra::ring::MAX_QUEUE_DEPTH;

fn dangling(table: &'static str, index: usize) -> ConfigError {
    ConfigError::DanglingReference { table, index }
}

fn back_reference(table: &'static str, index: usize) -> ConfigError {
    ConfigError::BackReference { table, index }
}

fn range_within(range: &Range<u16>, len: usize) -> bool {
    range.start <= range.end && (range.end as usize) <= len
}

fn check_depth(table: &'static str, index: usize, depth: u8) -> Result<(), ConfigError> {
    if depth == 0 || depth as u16 > MAX_QUEUE_DEPTH {
        return Err(ConfigError::QueueDepth {
            table,
            index,
            depth,
        });
    }
    Ok(())
}

/// Segments and selector bytes must lie inside a buffer of `length` bytes.
fn layout_fits(
    segments: &[Segment],
    selector: &[SelectorPattern],
    order: ByteOrder,
    length: u16,
) -> bool {
    segments
        .iter()
        .all(|seg| byte_span(*seg, order).end <= length as usize)
        && selector.iter().all(|pat| pat.byte_position < length)
}

impl IpduMConfig<'_> {
    /// Check every cross reference and the geometry of all PDUs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_routing()?;
        self.validate_mux_tx()?;
        self.validate_mux_rx()?;
        self.validate_container_tx()?;
        self.validate_contained_tx()?;
        self.validate_container_rx()?;
        self.validate_contained_rx()?;
        Ok(())
    }

    fn validate_routing(&self) -> Result<(), ConfigError> {
        for (index, target) in self.tx_up.iter().enumerate() {
            let ok = match *target {
                TxUpTarget::MuxPart(p) => (p as usize) < self.mux_tx_parts.len(),
                TxUpTarget::Contained(c) => (c as usize) < self.contained_tx.len(),
            };
            if !ok {
                return Err(dangling("tx_up", index));
            }
        }

        for (index, info) in self.tx_lo.iter().enumerate() {
            if info.partition >= self.partition_count {
                return Err(ConfigError::Partition {
                    table: "tx_lo",
                    index,
                });
            }
            let owner = match info.target {
                TxLoTarget::Pathway(p) => self.mux_tx_pathways.get(p as usize).map(|w| w.tx_lo),
                TxLoTarget::Container(c) => self.container_tx.get(c as usize).map(|c| c.tx_lo),
            };
            match owner {
                None => return Err(dangling("tx_lo", index)),
                Some(tx_lo) if tx_lo as usize != index => {
                    return Err(back_reference("tx_lo", index))
                }
                Some(_) => {}
            }
        }

        for (index, target) in self.rx_lo.iter().enumerate() {
            let ok = match *target {
                RxLoTarget::Pathway(p) => (p as usize) < self.mux_rx_pathways.len(),
                RxLoTarget::Container(c) => (c as usize) < self.container_rx.len(),
            };
            if !ok {
                return Err(dangling("rx_lo", index));
            }
        }
        Ok(())
    }

    fn validate_mux_tx(&self) -> Result<(), ConfigError> {
        for (index, pathway) in self.mux_tx_pathways.iter().enumerate() {
            match self.tx_lo.get(pathway.tx_lo as usize) {
                None => return Err(dangling("mux_tx_pathways", index)),
                Some(info) if info.target != TxLoTarget::Pathway(index as u16) => {
                    return Err(back_reference("mux_tx_pathways", index))
                }
                Some(_) => {}
            }
            if !range_within(&pathway.dynamic_parts, self.mux_tx_parts.len()) {
                return Err(dangling("mux_tx_pathways", index));
            }
            if let Some(part) = pathway.static_part {
                match self.mux_tx_parts.get(part as usize) {
                    None => return Err(dangling("mux_tx_pathways", index)),
                    Some(p) if p.kind != PartKind::Static || p.pathway as usize != index => {
                        return Err(back_reference("mux_tx_pathways", index))
                    }
                    Some(_) => {}
                }
            }
            for part in pathway.dynamic_parts.clone() {
                let p = &self.mux_tx_parts[part as usize];
                if p.kind != PartKind::Dynamic || p.pathway as usize != index {
                    return Err(back_reference("mux_tx_pathways", index));
                }
            }
            if let Some(initial) = pathway.initial_dynamic_part {
                if !pathway.dynamic_parts.contains(&initial) {
                    return Err(dangling("mux_tx_pathways", index));
                }
            }
        }

        for (index, part) in self.mux_tx_parts.iter().enumerate() {
            let Some(pathway) = self.mux_tx_pathways.get(part.pathway as usize) else {
                return Err(dangling("mux_tx_parts", index));
            };
            let owned = match part.kind {
                PartKind::Static => pathway.static_part == Some(index as u16),
                PartKind::Dynamic => pathway.dynamic_parts.contains(&(index as u16)),
            };
            if !owned {
                return Err(back_reference("mux_tx_parts", index));
            }
            if part.length > pathway.length
                || !layout_fits(
                    part.segments,
                    part.selector,
                    pathway.byte_order,
                    pathway.length,
                )
            {
                return Err(ConfigError::SegmentOutOfRange {
                    index: part.pathway as usize,
                });
            }
        }
        Ok(())
    }

    fn validate_mux_rx(&self) -> Result<(), ConfigError> {
        for (index, pathway) in self.mux_rx_pathways.iter().enumerate() {
            let fits = |part: &MuxRxPart<'_>| {
                part.min_dlc <= pathway.buffer_length
                    && layout_fits(
                        part.segments,
                        part.selector,
                        pathway.byte_order,
                        pathway.buffer_length,
                    )
            };
            let static_ok = pathway.static_part.as_ref().map_or(true, fits);
            if !static_ok || !pathway.dynamic_parts.iter().all(fits) {
                return Err(ConfigError::SegmentOutOfRange { index });
            }
        }
        Ok(())
    }

    fn validate_container_tx(&self) -> Result<(), ConfigError> {
        for (index, container) in self.container_tx.iter().enumerate() {
            match self.tx_lo.get(container.tx_lo as usize) {
                None => return Err(dangling("container_tx", index)),
                Some(info) if info.target != TxLoTarget::Container(index as u16) => {
                    return Err(back_reference("container_tx", index))
                }
                Some(_) => {}
            }
            if container.partition >= self.partition_count {
                return Err(ConfigError::Partition {
                    table: "container_tx",
                    index,
                });
            }
            if !range_within(&container.contained, self.contained_tx.len()) {
                return Err(dangling("container_tx", index));
            }
            if self.contained_tx[container.contained.start as usize..container.contained.end as usize]
                .iter()
                .any(|c| c.container as usize != index)
            {
                return Err(back_reference("container_tx", index));
            }
            match container.collection {
                Collection::Queued { depth } => check_depth("container_tx", index, depth)?,
                Collection::LastIsBest { queue_depths } => {
                    if queue_depths.is_empty() {
                        return Err(ConfigError::QueueDepth {
                            table: "container_tx",
                            index,
                            depth: 0,
                        });
                    }
                    for depth in queue_depths {
                        check_depth("container_tx", index, *depth)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn validate_contained_tx(&self) -> Result<(), ConfigError> {
        for (index, contained) in self.contained_tx.iter().enumerate() {
            let Some(container) = self.container_tx.get(contained.container as usize) else {
                return Err(dangling("contained_tx", index));
            };
            check_contained_geometry(
                index,
                container.header,
                container.length,
                contained.header_id,
                contained.offset,
                contained.length,
                contained.update_bit,
            )?;
            if let Collection::LastIsBest { queue_depths } = container.collection {
                if contained.priority as usize >= queue_depths.len() {
                    return Err(dangling("contained_tx", index));
                }
            }
        }
        Ok(())
    }

    fn validate_container_rx(&self) -> Result<(), ConfigError> {
        for (index, container) in self.container_rx.iter().enumerate() {
            if container.partition >= self.partition_count {
                return Err(ConfigError::Partition {
                    table: "container_rx",
                    index,
                });
            }
            if !range_within(&container.contained, self.contained_rx.len()) {
                return Err(dangling("container_rx", index));
            }
            if self.contained_rx[container.contained.start as usize..container.contained.end as usize]
                .iter()
                .any(|c| c.container as usize != index)
            {
                return Err(back_reference("container_rx", index));
            }
            if let RxProcessing::Deferred { queue_depth } = container.processing {
                check_depth("container_rx", index, queue_depth)?;
            }
        }
        Ok(())
    }

    fn validate_contained_rx(&self) -> Result<(), ConfigError> {
        for (index, contained) in self.contained_rx.iter().enumerate() {
            let Some(container) = self.container_rx.get(contained.container as usize) else {
                return Err(dangling("contained_rx", index));
            };
            if container.header.is_dynamic() {
                // Received DLCs are checked while scanning; only the id is constrained.
                check_contained_geometry(
                    index,
                    container.header,
                    container.length,
                    contained.header_id,
                    0,
                    0,
                    None,
                )?;
            } else {
                check_contained_geometry(
                    index,
                    container.header,
                    container.length,
                    contained.header_id,
                    contained.offset,
                    contained.length,
                    contained.update_bit,
                )?;
            }
        }
        Ok(())
    }
}

/// Header id, DLC range and placement of one contained PDU.
fn check_contained_geometry(
    index: usize,
    header: HeaderSize,
    container_length: u16,
    header_id: u32,
    offset: u16,
    length: u16,
    update_bit: Option<u16>,
) -> Result<(), ConfigError> {
    match header {
        HeaderSize::None => {
            if offset as usize + length as usize > container_length as usize {
                return Err(ConfigError::ContainedTooLarge { index });
            }
            if let Some(bit) = update_bit {
                if bit as usize >= container_length as usize * 8 {
                    return Err(ConfigError::UpdateBitOutOfRange { index });
                }
            }
        }
        HeaderSize::Short | HeaderSize::Long => {
            if header_id == 0 {
                return Err(ConfigError::ReservedHeaderId { index });
            }
            if header == HeaderSize::Short
                && (header_id > SHORT_HEADER_MAX_ID || length as u32 > SHORT_HEADER_MAX_DLC)
            {
                return Err(ConfigError::HeaderRange { index });
            }
            if header.bytes() + length as usize > container_length as usize {
                return Err(ConfigError::ContainedTooLarge { index });
            }
        }
    }
    Ok(())
}
