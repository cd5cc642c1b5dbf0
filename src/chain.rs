//! Cluster-chain traversal.

use crate::device::BlockDeviceDriver;
use crate::error::FatError;
use crate::table::Cluster;
use crate::volume::FatVolume;

impl<D: BlockDeviceDriver> FatVolume<D> {
    /// Advance `count` links along the chain headed (or continued) by
    /// `cluster`, reading the primary FAT copy once per step.
    ///
    /// Returns `EndOfList` the first time the looked-up value exceeds the
    /// width's maximum cluster; starting from a value already past it is
    /// `InvalidValue`. Seeking walks this from the chain head with
    /// `count = target / cluster_size`, so a seek is O(target / cluster_size).
    pub fn next_cluster(&mut self, cluster: Cluster, count: u32) -> Result<Cluster, FatError> {
        let max_cluster = self.geometry.fat_type.max_cluster();
        if cluster.0 > max_cluster {
            return Err(FatError::InvalidValue);
        }

        let mut current = cluster;
        for _ in 0..count {
            let value = self.read_fat_entry(0, current)?;
            if value > max_cluster {
                return Err(FatError::EndOfList);
            }
            current = Cluster(value);
        }

        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    use crate::testing::fat16_volume;

    #[test]
    fn walking_zero_steps_stays_put() {
        let mut volume = fat16_volume();
        assert_eq!(volume.next_cluster(Cluster(2), 0), Ok(Cluster(2)));
    }

    #[test]
    fn walking_past_the_end_marker() {
        let mut volume = fat16_volume();
        volume.write_fat_entry(Cluster(2), 3).unwrap();
        volume.write_fat_entry(Cluster(3), 0xFFFF).unwrap();

        assert_eq!(volume.next_cluster(Cluster(2), 1), Ok(Cluster(3)));
        assert_eq!(volume.next_cluster(Cluster(2), 2), Err(FatError::EndOfList));
        assert_eq!(
            volume.next_cluster(Cluster(0xFFFF), 1),
            Err(FatError::InvalidValue)
        );
    }

    proptest! {
        #[test]
        fn one_call_equals_repeated_single_steps(links in prop::collection::vec(10_u32..5000, 1..24)) {
            let mut volume = fat16_volume();

            // Build a chain 2 -> links[0] -> links[1] -> ... -> end marker.
            let mut chain = vec![2_u32];
            for &link in &links {
                if chain.contains(&link) {
                    continue;
                }
                let tail = *chain.last().unwrap();
                volume.write_fat_entry(Cluster(tail), link).unwrap();
                chain.push(link);
            }
            volume.write_fat_entry(Cluster(*chain.last().unwrap()), 0xFFFF).unwrap();

            for steps in 0..chain.len() as u32 {
                let mut single = Cluster(2);
                for _ in 0..steps {
                    single = volume.next_cluster(single, 1).unwrap();
                }
                prop_assert_eq!(volume.next_cluster(Cluster(2), steps), Ok(single));
                prop_assert_eq!(single, Cluster(chain[steps as usize]));
            }

            prop_assert_eq!(
                volume.next_cluster(Cluster(2), chain.len() as u32),
                Err(FatError::EndOfList)
            );
        }
    }
}
