//! Rolling-hash block index used to find delta match candidates.
//!
//! Mirrors the block-hash scheme used by JGit's delta indexer: a 16-byte
//! non-overlapping block hash seeded from the first four bytes, then two
//! fixed 256-entry permutation tables (`T`, `U`) used both to extend a
//! fresh block hash and to roll the hash window by one byte at a time.
//! The tables below are not copied from any external source (we had no
//! access to JGit's actual constants in this environment); they are a
//! fixed, deterministically generated 32-bit permutation with the same
//! structural role. Because the index is only ever used as a match
//! *hint* — every candidate is verified with a real byte compare before
//! being trusted — the exact table values do not affect correctness,
//! only how eagerly matches are found.

pub const BLOCK_SIZE: usize = 16;
pub const MAX_CHAIN_LENGTH: usize = 64;

pub(crate) const TABLE_T: [u32; 256] = [
    0x3d42334e, 0x3524086f, 0x6da9a55d, 0xe60c6f57, 0x0ce5bad2, 0x6be4a39f, 0xed05bc0d, 0x57a52f29,
    0x36871668, 0xce35f68f, 0x1b6cb673, 0xb1b97875, 0x86e581f9, 0x9b9d5ce5, 0xe0b883d1, 0xe639fc5c,
    0x1e3037f6, 0x5e0f334f, 0xf8fbb0bd, 0x0bbea169, 0xb9b90456, 0xc259a8f5, 0x13fbc320, 0x031635d3,
    0x0b08284b, 0xf9b9fa5b, 0x13e878eb, 0x6d9c1e78, 0x48b190b8, 0xf8d2ce54, 0x97a6abf2, 0x23c1c44e,
    0x9de70da7, 0x5b9810c5, 0x6365871e, 0x674f34f8, 0x96f56b77, 0xfd2885f7, 0x492f2fb9, 0x7e4e7059,
    0xfdc89d8c, 0x1bc97e14, 0x235b89af, 0x0b4f872f, 0xf3cc1f46, 0x186cdf2f, 0x21e067dd, 0x397200cb,
    0x18950e2d, 0xef1edaf9, 0x6360c0d4, 0xf28cc0eb, 0xfb8a3f4e, 0xd1325b8f, 0x7a666696, 0xbb472ff3,
    0x77eda1ee, 0xe9f3cd16, 0x4668b0e3, 0x91f0465a, 0xb2b4d014, 0xb3cc99bd, 0x7c447fb4, 0x90a3dd39,
    0x1c4911de, 0xd3d89d2e, 0x0e839d80, 0xd8181bf8, 0x271fa7bb, 0xf6bb24e4, 0x72a8a8e5, 0xca159557,
    0x3e605c8e, 0x5ccec860, 0x095d41cc, 0x63289a0c, 0xfdab9ae8, 0x9529e3b6, 0xddffb929, 0x268c4cbd,
    0x6bb34024, 0x8cabc425, 0x848295d6, 0xc9f3d17c, 0x8c2728b3, 0xc56be1ae, 0xbb722a1f, 0x903ab210,
    0xa9890036, 0xd39ee648, 0xd669d3a2, 0xc246d1bd, 0xadefbc64, 0xdcca2ba3, 0x1cfab5f7, 0x84a046d1,
    0xc19765a1, 0xd88b5548, 0x2a2277eb, 0x689224e4, 0x5a908788, 0x1d90c45b, 0x05b9f878, 0x2f22fd93,
    0x2624fdc5, 0xbb1b5cba, 0xae4e8904, 0x9f025187, 0x6e15af42, 0x63380b0d, 0xd3b8dcbd, 0x59c2281e,
    0x3b2b5440, 0xbd31a9ae, 0x3059659c, 0xc05a0af9, 0xe0e191f4, 0xa0128c51, 0x429654b9, 0x1fd8860f,
    0x5d785090, 0x877d7448, 0x7cf820aa, 0x277794f2, 0x0754d2e3, 0x2af81c1b, 0xe05caaa6, 0xf0733549,
    0xbf2ed872, 0x080c2e45, 0x257f6779, 0x0145f57d, 0x0eaeb74a, 0x4e7b8741, 0x59e9096e, 0xfbb5b7d7,
    0x8bb35097, 0xcb666b4d, 0x4f460792, 0x86ba7be9, 0x2bd1b544, 0xef6cdb03, 0x29a46076, 0x48051085,
    0xef7cdc63, 0x587611f4, 0x0f8a5735, 0x35bde1e1, 0x43257e2b, 0x04e85da1, 0x49eb0cb2, 0x85bd517b,
    0xb9479b3e, 0x4b3bbe8d, 0xc3ba3c33, 0x35107aea, 0x225d518b, 0xf88db016, 0xeec0bd71, 0x5a8a87c2,
    0xeba2363b, 0x3140b3ed, 0xe761d488, 0xbf4d504f, 0xaf4ed9d4, 0xc8529128, 0x91d7c893, 0xfdaefc1b,
    0x78bf7a33, 0x395f0b57, 0xab4528e4, 0x6aee7464, 0xd63053ad, 0xb24a59aa, 0xb071d727, 0xb27ad778,
    0x3e2db761, 0x24cb01f5, 0x178b78e6, 0xf5484419, 0xdac50cf7, 0xbb4e36d6, 0x59e35caa, 0x72d9258f,
    0xf84f7537, 0x3e8b8295, 0x610f25db, 0x4b11b24c, 0x43b483db, 0x89d7377f, 0x0005a2e2, 0x546d57af,
    0xc1bc0b3e, 0x586d0c14, 0x865e722b, 0xbafd6ff5, 0xde0d06a7, 0x3da887d7, 0x2e08b41d, 0xbda394e8,
    0x072bd225, 0xd4d64456, 0x48b1b74e, 0x9e84a147, 0x986efd2c, 0x4a423e31, 0xdb7f0d38, 0xc41f2fab,
    0x00ad7714, 0x224c8d97, 0x3a362f4d, 0x250a8ba8, 0x880ade44, 0xc36a2a2e, 0x1544a8f3, 0xb52a52e2,
    0x31dbddd4, 0x4f7dc014, 0xe43ea9e3, 0x9a65dc80, 0x06f047de, 0x8538aa09, 0x8ee882a2, 0x44b49fba,
    0xa7c017c3, 0x09d2a35f, 0x17e17b8b, 0x21563566, 0x8f266af1, 0x06dcb3a1, 0xbf4b203f, 0x7d3a7c22,
    0x4c2dce56, 0x6cae4efd, 0x8fc6b25f, 0x3307aa23, 0x579badf9, 0x72c94f8b, 0x58db1b13, 0x5e5d6bf1,
    0x07acd25f, 0x8973a8fe, 0xebb20bb9, 0x55378705, 0x0c8add79, 0x82ae8987, 0x699cee16, 0x68c6fcba,
    0xed8827c1, 0x26a7db8f, 0xefac4d8d, 0x64e09a9c, 0x6a39ea64, 0x77e87e80, 0x107089f9, 0xeb80cec9,
];

pub(crate) const TABLE_U: [u32; 256] = [
    0x69cc2e4c, 0x39e235f2, 0xf03c5923, 0x4a8b3bf3, 0x9644d397, 0x54500cc8, 0x5088303e, 0x004973d9,
    0xb59f7a06, 0x4d215a92, 0x01f583d5, 0xbb03cd05, 0xf0c7f786, 0x08274a8b, 0xb49efbc5, 0x2d468e88,
    0x7abf2fce, 0x73b52369, 0x4485e05c, 0xc12bc740, 0x27669bd2, 0x2c15036a, 0xd1e5fa7c, 0xa73724af,
    0x1630c326, 0xc18117e9, 0xcc1c7e86, 0xc271677f, 0x4ea0acbf, 0x4494abeb, 0xd6998078, 0xf9eb9704,
    0x8865c78a, 0xc11c6e75, 0xe507da34, 0xcec6732d, 0xa124a7cb, 0xe0d81c83, 0x6d587a27, 0x56ac6899,
    0xf33c1bf2, 0x6ab03ebf, 0x73ac642b, 0x596aba79, 0x38132762, 0x14fd95dc, 0x094a9afc, 0xef478697,
    0x6298f75d, 0xc4b9106e, 0xa621ed2e, 0x1323529e, 0x85e20dc4, 0xe66befbb, 0xe4ea708b, 0xd68548e5,
    0x5c7ed3d9, 0x155c760f, 0x978a6d2e, 0x338c2fdb, 0x4d646884, 0xa5861285, 0x357dff88, 0xb7e47198,
    0x9e8fe90b, 0x61395853, 0xd091b1df, 0x6a236a0a, 0xcd937f93, 0xe8895582, 0xc9d870fe, 0xabd72d9e,
    0xf79dab19, 0xa59924dc, 0x5b430822, 0x5e794e2f, 0x588546f6, 0x2f992db2, 0x01576e4d, 0xef1c714f,
    0x8341cbb5, 0xafd26595, 0xfbfdabf5, 0x976418bb, 0x2947e215, 0xef9a3cf3, 0x5ea92428, 0x8d4a7033,
    0x92c06d1d, 0xf7745483, 0xa2b3fac4, 0xf008979f, 0x914c947c, 0x03ed95e9, 0x447e4305, 0x747ae66a,
    0xa29f0609, 0x1ecffdbd, 0x4e1f5b6e, 0x91afd289, 0x4d87d15c, 0x5afe8f87, 0x6dc32c41, 0x9245db9c,
    0x07dde8b8, 0x83e94241, 0xd9f2a6d4, 0x8ec58888, 0x7dd74f3b, 0x3edea337, 0x140c44eb, 0x9c0a896f,
    0x9b5facca, 0xb47b89b2, 0xcedd1c6c, 0xec3739ea, 0x96c3825c, 0xec27e7c2, 0x583a9944, 0x13ae2229,
    0x589d25ed, 0xd873c356, 0x79ebf7ce, 0xd33940ca, 0x4b3db580, 0xcbf643e9, 0x876042b6, 0x465602e5,
    0x9d6d63ae, 0x2dd50f2a, 0xce35d653, 0xd8a256f3, 0x0426a7af, 0x371e0927, 0x0da6a518, 0xaead9624,
    0x74b456a7, 0x1c658542, 0x6d451752, 0xd8ec2a51, 0xe3ca322b, 0xce6b2316, 0x2b08c295, 0x8421e557,
    0x82f51964, 0x8bd8f0dd, 0xca1a6564, 0x7a034168, 0xe441f975, 0x7edd67e6, 0x95b592b4, 0x82eada68,
    0xbafc5c11, 0x36d2887d, 0xe912d1fd, 0x072664f7, 0xff077023, 0xa618e2b5, 0x1c025908, 0xc1ebbd7a,
    0x86f3b108, 0x517615f9, 0x8e75429f, 0x1df6cd4e, 0xd36cd289, 0xc99c003a, 0xcc4c5ff7, 0x317df09c,
    0xdc200852, 0x402e323e, 0xbe28614c, 0x02347971, 0xecabea26, 0xafe7750b, 0x7c83f9d5, 0x15336fd5,
    0x6436f859, 0xdeebd3ba, 0x4b0b3607, 0x6bf08d71, 0x96f4c57c, 0xd4f521a0, 0x059ed971, 0x4193e71d,
    0x5c611c01, 0x43f4e829, 0x8b9f455b, 0x086104f2, 0x3a2e62ea, 0x46a5437b, 0x1150ce53, 0x268c28eb,
    0x1173d648, 0xf9221af2, 0xcd47b821, 0x38a174d2, 0xae7623ff, 0xc515d732, 0xf8d601cd, 0x417873d4,
    0x400c2dd2, 0xb630937e, 0x34ccf598, 0xb47bba00, 0x32987862, 0x2c791a6f, 0x8625e437, 0x2c7b93ad,
    0x6e659ef9, 0x175bef92, 0x06a7b961, 0x3e150b80, 0x0b033013, 0xf24206f8, 0x9f7ea9d8, 0x82f709aa,
    0xf739e8be, 0x3c9f581b, 0x82a62955, 0x28e37e0d, 0xf2967130, 0x0f8ae32e, 0x68cb952e, 0x8d00eb57,
    0xe86f6838, 0x8e1fcd94, 0x5f64fc13, 0x22d37289, 0x39d25dc1, 0xad2b64f2, 0x6b4914fa, 0xd5c418e1,
    0x8800ba13, 0xd06e2c55, 0x6c03125a, 0x74aeb611, 0x4af293bf, 0x6bc3e06f, 0x5318e6ed, 0x3cdc21f5,
    0xe582af91, 0x9840e96c, 0x3e407c4b, 0x3281f24f, 0xb36be7ac, 0xfb24769d, 0xc7233277, 0xc3121842,
    0xf256de5b, 0x2beb9391, 0x4e396e02, 0x99c3a8d6, 0x8512805d, 0xd47c5bb7, 0x774ecb82, 0x944919d2,
];

/// Hash one non-overlapping `BLOCK_SIZE`-byte block, used when indexing the
/// source buffer.
pub fn hash_block(block: &[u8]) -> u32 {
    debug_assert_eq!(block.len(), BLOCK_SIZE);
    let mut h = u32::from_be_bytes([block[0], block[1], block[2], block[3]]);
    for (i, &b) in block.iter().enumerate().skip(4) {
        let table_index = if i == 4 {
            (h >> 31) as usize & 0xff
        } else {
            (h >> 23) as usize & 0xff
        };
        h = (h << 8 | b as u32) ^ TABLE_T[table_index];
    }
    h
}

/// Roll the hash window forward by one byte: `out` leaves the window at the
/// back, `in_byte` enters at the front.
pub fn roll_hash(h: u32, out: u8, in_byte: u8) -> u32 {
    let table_index = (h >> 23) as usize & 0xff;
    (h << 8 | in_byte as u32) ^ TABLE_T[table_index] ^ TABLE_U[out as usize]
}

/// A hash-bucketed index over non-overlapping `BLOCK_SIZE` blocks of a
/// source buffer, used to find candidate match offsets while deltifying.
pub struct BlockIndex {
    mask: usize,
    buckets: Vec<Vec<usize>>,
}

impl BlockIndex {
    /// Build an index over `source`. Offsets earlier in `source` are kept
    /// at the front of each bucket's candidate list (and chains longer than
    /// [`MAX_CHAIN_LENGTH`] are truncated to the earliest offsets).
    pub fn build(source: &[u8]) -> Self {
        let block_count = source.len() / BLOCK_SIZE;
        let table_size = block_count.max(1).next_power_of_two();
        let mask = table_size - 1;
        let mut buckets: Vec<Vec<usize>> = vec![Vec::new(); table_size];

        // Scan backwards so that re-inserting at the front of each bucket
        // leaves the earliest offset for a given hash at the head of its
        // chain once the whole source has been indexed.
        for block_idx in (0..block_count).rev() {
            let offset = block_idx * BLOCK_SIZE;
            let hash = hash_block(&source[offset..offset + BLOCK_SIZE]);
            let bucket = &mut buckets[hash as usize & mask];
            bucket.insert(0, offset);
            if bucket.len() > MAX_CHAIN_LENGTH {
                bucket.truncate(MAX_CHAIN_LENGTH);
            }
        }

        Self { mask, buckets }
    }

    /// Candidate source offsets whose block hash matches `hash`, earliest
    /// offset first. Candidates must still be verified with a byte compare.
    pub fn candidates(&self, hash: u32) -> &[usize] {
        &self.buckets[hash as usize & self.mask]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_block_is_deterministic() {
        let block = b"0123456789abcdef";
        assert_eq!(hash_block(block), hash_block(block));
    }

    #[test]
    fn hash_block_differs_for_different_input() {
        let a = b"0123456789abcdef";
        let b = b"0123456789abcdeg";
        assert_ne!(hash_block(a), hash_block(b));
    }

    #[test]
    fn build_index_over_empty_source() {
        let index = BlockIndex::build(b"");
        assert!(index.candidates(0).is_empty());
    }

    #[test]
    fn build_index_finds_repeated_block() {
        let mut source = vec![0u8; BLOCK_SIZE];
        source.extend_from_slice(&[1u8; BLOCK_SIZE]);
        source.extend_from_slice(&[0u8; BLOCK_SIZE]);

        let index = BlockIndex::build(&source);
        let hash = hash_block(&[0u8; BLOCK_SIZE]);
        let candidates = index.candidates(hash);
        // Earliest offset (0) must appear before the later duplicate (32).
        assert_eq!(candidates.first().copied(), Some(0));
        assert!(candidates.contains(&32));
    }

    #[test]
    fn chain_length_is_truncated() {
        let mut source = Vec::new();
        for _ in 0..(MAX_CHAIN_LENGTH + 10) {
            source.extend_from_slice(&[7u8; BLOCK_SIZE]);
        }
        let index = BlockIndex::build(&source);
        let hash = hash_block(&[7u8; BLOCK_SIZE]);
        assert!(index.candidates(hash).len() <= MAX_CHAIN_LENGTH);
    }

    #[test]
    fn roll_hash_is_deterministic() {
        let h = hash_block(b"0123456789abcdef");
        let rolled = roll_hash(h, b'0', b'g');
        assert_eq!(rolled, roll_hash(h, b'0', b'g'));
    }
}
