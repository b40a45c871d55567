//! device path completion module
//! This module rebuilds a bootable device path from a boot option's partial path.
//!
//! Boot options usually store a short-form path starting at the partition
//! node, e.g. `HD(1,GPT,...)/\EFI\debian\grubx64.efi`. The firmware's live
//! volumes have full paths ending at that partition node, e.g.
//! `PciRoot(0)/Pci(1f,2)/Sata(0,0)/HD(1,GPT,...)`. Completion finds the
//! volume whose partition node equals the partial path's first node and
//! appends the rest of the partial path to it.

// alloc
use alloc::vec::Vec;

// log
use log::{debug, info, warn};

// device paths
use crate::devpath::DevicePath;

// firmware status
use super::FwStatus;

/// Filesystem Volume Enumeration Capability
pub trait VolumeSource {
    // full device paths of every handle supporting the simple file system protocol
    fn volume_paths(&self) -> Result<Vec<DevicePath>, FwStatus>;
}

// partition_matches() function
/// Check whether `partial` starts on the partition `volume` ends with
pub fn partition_matches(volume: &DevicePath, partial: &DevicePath) -> bool {
    match (volume.last(), partial.first()) {
        (Some(partition), Some(first)) => partition == first,
        _ => false,
    }
}

// complete_path() function
/// Complete `partial` against a list of volume paths, first match wins
pub fn complete_path(volumes: &[DevicePath], partial: &DevicePath) -> Option<DevicePath> {
    for volume in volumes {
        debug!("checking volume {}", volume);
        if partition_matches(volume, partial) {
            // drop the partial path's own partition node, keep the file part
            return Some(volume.append(&partial.nodes()[1..]));
        }
    }
    None
}

/// Device Path Completer
pub struct DevicePathCompleter<'a, S: VolumeSource + ?Sized> {
    source: &'a S,
}

// DevicePathCompleter methods
impl<'a, S: VolumeSource + ?Sized> DevicePathCompleter<'a, S> {
    // new() method
    pub fn new(source: &'a S) -> DevicePathCompleter<'a, S> {
        DevicePathCompleter { source }
    }

    // complete() method
    /// Build the full path of `partial` on whichever live volume holds it
    ///
    /// Returns `None` when the volume is not present or the volumes cannot
    /// be enumerated.
    pub fn complete(&self, partial: &DevicePath) -> Option<DevicePath> {
        let volumes = match self.source.volume_paths() {
            Ok(v) => v,
            Err(e) => {
                warn!("could not enumerate filesystem volumes: {}", e);
                return None;
            }
        };
        debug!("{} filesystem volume(s) found", volumes.len());

        match complete_path(&volumes, partial) {
            Some(path) => {
                info!("final boot path: {}", path);
                Some(path)
            }
            None => {
                warn!("no volume holds {}", partial);
                None
            }
        }
    }
}

// Tests
#[cfg(test)]
mod test {
    use super::*;
    use crate::constants::*;
    use crate::devpath::DevicePathNode;

    struct MockVolumes(Result<Vec<DevicePath>, FwStatus>);

    impl VolumeSource for MockVolumes {
        fn volume_paths(&self) -> Result<Vec<DevicePath>, FwStatus> {
            self.0.clone()
        }
    }

    fn node(kind: u8, sub_kind: u8, data: &[u8]) -> DevicePathNode {
        DevicePathNode::new(kind, sub_kind, data.to_vec()).unwrap()
    }

    fn hd(partition: u8, signature: u8) -> DevicePathNode {
        let mut data = vec![partition, 0, 0, 0];
        data.extend_from_slice(&[signature; 38]);
        node(EFI_DP_TYPE_MEDIA, EFI_DP_SUBTYPE_HARD_DRIVE, &data)
    }

    fn volume(port: u8, partition: DevicePathNode) -> DevicePath {
        DevicePath::new(vec![
            node(0x02, 0x01, &[0xd0, 0x41, 0x03, 0x0a, 0, 0, 0, 0]),
            node(0x01, 0x01, &[0x02, 0x1f]),
            node(0x03, 0x12, &[port, 0, 0xff, 0xff, 0, 0]),
            partition,
        ])
    }

    fn partial(partition: DevicePathNode, file: &str) -> DevicePath {
        DevicePath::new(vec![partition, DevicePathNode::file_path(file).unwrap()])
    }

    #[test]
    fn complete_on_matching_volume() {
        let volumes = MockVolumes(Ok(vec![
            volume(0, hd(1, 0xaa)),
            volume(1, hd(1, 0xbb)),
            volume(1, hd(2, 0xbb)),
        ]));
        let partial = partial(hd(1, 0xbb), "\\EFI\\debian\\grubx64.efi");

        let full = DevicePathCompleter::new(&volumes).complete(&partial).unwrap();
        let mut expected = volume(1, hd(1, 0xbb));
        expected.push(DevicePathNode::file_path("\\EFI\\debian\\grubx64.efi").unwrap());
        assert_eq!(full, expected);
        assert_eq!(full.len(), 5);
    }

    #[test]
    fn first_matching_volume_wins() {
        let first = volume(0, hd(1, 0xcc));
        let second = volume(7, hd(1, 0xcc));
        let partial = partial(hd(1, 0xcc), "\\a.efi");
        let full = complete_path(&[first.clone(), second], &partial).unwrap();
        assert_eq!(&full.nodes()[..4], first.nodes());
    }

    #[test]
    fn no_matching_volume() {
        let volumes = MockVolumes(Ok(vec![volume(0, hd(1, 0xaa)), volume(1, hd(2, 0xaa))]));
        let partial = partial(hd(3, 0xaa), "\\EFI\\BOOT\\BOOTX64.EFI");
        assert_eq!(DevicePathCompleter::new(&volumes).complete(&partial), None);
    }

    #[test]
    fn empty_paths_never_match() {
        let partial = partial(hd(1, 1), "\\x.efi");
        assert!(!partition_matches(&DevicePath::default(), &partial));
        assert!(!partition_matches(&volume(0, hd(1, 1)), &DevicePath::default()));
        assert_eq!(
            complete_path(&[DevicePath::default()], &DevicePath::default()),
            None
        );
    }

    #[test]
    fn enumeration_failure() {
        let volumes = MockVolumes(Err(FwStatus(14)));
        let partial = partial(hd(1, 1), "\\x.efi");
        assert_eq!(DevicePathCompleter::new(&volumes).complete(&partial), None);
    }
}
