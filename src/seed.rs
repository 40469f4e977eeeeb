//! Deterministic synthetic data for `/init`

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::SeedConfig;
use crate::model::{SomeData, SubData};

pub struct Generator {
    rng: StdRng,
    config: SeedConfig,
}

impl Generator {
    pub fn new(config: &SeedConfig) -> Self {
        Self {
            rng: StdRng::seed_from_u64(config.seed),
            config: config.clone(),
        }
    }

    /// Random lowercase ASCII string of the configured length
    pub fn random_string(&mut self) -> String {
        (0..self.config.string_len)
            .map(|_| (b'a' + self.rng.gen_range(0..26u8)) as char)
            .collect()
    }

    fn random_int(&mut self) -> i64 {
        self.rng.gen_range(1..=self.config.max_int)
    }

    pub fn sub_data(&mut self) -> SubData {
        SubData {
            str0: Some(self.random_string()),
            int0: Some(self.random_int()),
            int1: Some(self.random_int()),
            int2: Some(self.random_int()),
            int3: Some(self.random_int()),
            int4: Some(self.random_int()),
        }
    }

    /// One record; `prop5` is deliberately left unset
    pub fn some_data(&mut self) -> SomeData {
        let prop0 = Some(self.random_string());
        let prop1 = Some(self.random_string());
        let prop2 = Some(self.random_string());
        let prop3 = Some(self.random_string());
        let prop4 = Some(self.random_string());
        let prop6 = Some(self.random_string());
        let prop7 = Some(self.random_string());
        let prop8 = Some(self.random_string());
        let flag = Some(self.rng.gen_range(1..=2) == 1);
        let items = (0..self.config.items_per_record)
            .map(|_| self.sub_data())
            .collect();

        SomeData {
            prop0,
            prop1,
            prop2,
            prop3,
            prop4,
            prop5: None,
            prop6,
            prop7,
            prop8,
            flag,
            items,
        }
    }

    /// Records for one `put_multi` call
    pub fn batch(&mut self) -> Vec<SomeData> {
        (0..self.config.records_per_batch)
            .map(|_| self.some_data())
            .collect()
    }

    /// Every batch of one seeding run
    pub fn batches(&mut self) -> Vec<Vec<SomeData>> {
        (0..self.config.batches).map(|_| self.batch()).collect()
    }
}
