#[cfg(test)]
mod tests {
    use percolator_client::{
        accounts::{
            self, build_account_metas, derive_associated_token_address, derive_lp_pda, derive_vault_authority,
            well_known,
        },
        constants::{
            account, config, engine, header, params, CONFIG_OFF, ENGINE_OFF, FLAG_PAUSED, FLAG_RESOLVED, MAGIC, VERSION,
        },
        error::{
            extract_error_code, parse_error_from_logs, translate_code, DecodeError, EncodeError, OutOfBounds,
            PercolatorError, ProgramExecutionError,
        },
        ix::{self, *},
        layout::{self, recover_signed, ByteWriter, Cursor},
        state::{AccountKind, RiskParams, SlabLayout},
        units,
    };
    use rand::{Rng, SeedableRng};
    use rand_xorshift::XorShiftRng;
    use solana_program::pubkey::Pubkey;

    const LAYOUT: SlabLayout = SlabLayout::SMALL;

    // --- Harness ---

    struct AccountFixture {
        owner: Pubkey,
        kind: u8,
        capital: u128,
        pnl: i64,
        position: i128,
        entry_price: u64,
        matcher_program: Pubkey,
        matcher_context: Pubkey,
    }

    impl AccountFixture {
        fn user(owner: Pubkey) -> Self {
            Self {
                owner,
                kind: AccountKind::User as u8,
                capital: 0,
                pnl: 0,
                position: 0,
                entry_price: 0,
                matcher_program: Pubkey::default(),
                matcher_context: Pubkey::default(),
            }
        }

        fn lp(owner: Pubkey, matcher_program: Pubkey, matcher_context: Pubkey) -> Self {
            Self { kind: AccountKind::Lp as u8, matcher_program, matcher_context, ..Self::user(owner) }
        }

        fn capital(mut self, capital: u128) -> Self { self.capital = capital; self }
        fn pnl(mut self, pnl: i64) -> Self { self.pnl = pnl; self }
        fn position(mut self, position: i128, entry_price: u64) -> Self {
            self.position = position;
            self.entry_price = entry_price;
            self
        }
    }

    struct SlabBuilder {
        layout: SlabLayout,
        data: Vec<u8>,
        next_id: u64,
    }

    impl SlabBuilder {
        fn new() -> Self {
            Self::with_layout(LAYOUT)
        }

        fn with_layout(layout: SlabLayout) -> Self {
            let mut data = vec![0u8; layout.slab_len()];
            layout::write_u64(&mut data, header::MAGIC, MAGIC, "magic").unwrap();
            layout::write_u32(&mut data, header::VERSION, VERSION, "version").unwrap();
            Self { layout, data, next_id: 1 }
        }

        fn admin(mut self, admin: &Pubkey) -> Self {
            layout::write_pubkey(&mut self.data, header::ADMIN, admin, "admin").unwrap();
            self
        }

        fn flags(mut self, flags: u8) -> Self {
            layout::write_u8(&mut self.data, header::FLAGS, flags, "flags").unwrap();
            self
        }

        fn market(mut self, mint: &Pubkey, vault: &Pubkey, feed: &Pubkey) -> Self {
            let d = &mut self.data;
            layout::write_pubkey(d, CONFIG_OFF + config::COLLATERAL_MINT, mint, "mint").unwrap();
            layout::write_pubkey(d, CONFIG_OFF + config::VAULT_PUBKEY, vault, "vault").unwrap();
            layout::write_pubkey(d, CONFIG_OFF + config::INDEX_FEED_ID, feed, "feed").unwrap();
            layout::write_u64(d, CONFIG_OFF + config::MAX_STALENESS_SECS, 60, "staleness").unwrap();
            layout::write_u16(d, CONFIG_OFF + config::CONF_FILTER_BPS, 50, "conf").unwrap();
            layout::write_bool(d, CONFIG_OFF + config::INVERT, true, "invert").unwrap();
            layout::write_i64(d, CONFIG_OFF + config::FUNDING_MAX_PREMIUM_BPS, -500, "premium").unwrap();
            layout::write_u128(d, CONFIG_OFF + config::THRESH_MAX, u128::MAX, "thresh_max").unwrap();
            layout::write_u64(d, CONFIG_OFF + config::LAST_EFFECTIVE_PRICE_E6, 142_500_000, "last_price").unwrap();
            self
        }

        fn engine(mut self, vault: u128, insurance: u128, slot: u64) -> Self {
            let d = &mut self.data;
            layout::write_u128(d, ENGINE_OFF + engine::VAULT, vault, "vault").unwrap();
            layout::write_u128(d, ENGINE_OFF + engine::INSURANCE_BALANCE, insurance, "insurance").unwrap();
            layout::write_u64(d, ENGINE_OFF + engine::CURRENT_SLOT, slot, "slot").unwrap();
            layout::write_i128(d, ENGINE_OFF + engine::NET_LP_POS, -7, "net_lp_pos").unwrap();
            layout::write_u64(d, ENGINE_OFF + engine::PARAMS + params::MAINTENANCE_MARGIN_BPS, 500, "mm").unwrap();
            let min_liq = ENGINE_OFF + engine::PARAMS + params::MIN_LIQUIDATION_ABS;
            layout::write_u128(d, min_liq, 1 << 100, "min_liq").unwrap();
            self
        }

        fn set_used(&mut self, idx: usize) {
            let off = self.layout.bitmap_off() + (idx / 64) * 8;
            let word = layout::read_u64(&self.data, off, "used").unwrap();
            layout::write_u64(&mut self.data, off, word | (1 << (idx % 64)), "used").unwrap();
            let used = layout::read_u16(&self.data, self.layout.num_used_off(), "num_used").unwrap();
            layout::write_u16(&mut self.data, self.layout.num_used_off(), used + 1, "num_used").unwrap();
        }

        fn write_record(&mut self, idx: usize, a: &AccountFixture) {
            let b = self.layout.account_off(idx);
            let d = &mut self.data;
            layout::write_u64(d, b + account::ACCOUNT_ID, self.next_id, "id").unwrap();
            layout::write_u128(d, b + account::CAPITAL, a.capital, "capital").unwrap();
            layout::write_u8(d, b + account::KIND, a.kind, "kind").unwrap();
            // PnL lives in the low word of its 16-byte slot.
            layout::write_u64(d, b + account::PNL, a.pnl as u64, "pnl").unwrap();
            layout::write_i128(d, b + account::POSITION_SIZE, a.position, "position").unwrap();
            layout::write_u64(d, b + account::ENTRY_PRICE, a.entry_price, "entry").unwrap();
            layout::write_pubkey(d, b + account::MATCHER_PROGRAM, &a.matcher_program, "matcher").unwrap();
            layout::write_pubkey(d, b + account::MATCHER_CONTEXT, &a.matcher_context, "ctx").unwrap();
            layout::write_pubkey(d, b + account::OWNER, &a.owner, "owner").unwrap();
            self.next_id += 1;
        }

        fn account(mut self, idx: usize, a: AccountFixture) -> Self {
            self.write_record(idx, &a);
            self.set_used(idx);
            self
        }

        /// Bytes left behind in a slot the bitmap says is free.
        fn stale(mut self, idx: usize, kind_tag: u8) -> Self {
            let garbage = AccountFixture { kind: kind_tag, ..AccountFixture::user(Pubkey::new_unique()) };
            self.write_record(idx, &garbage);
            self
        }

        fn build(mut self) -> Vec<u8> {
            let off = self.layout.next_account_id_off();
            layout::write_u64(&mut self.data, off, self.next_id, "next_id").unwrap();
            self.data
        }
    }

    // --- Builders ---

    fn encode_u64(val: u64, buf: &mut Vec<u8>) { buf.extend_from_slice(&val.to_le_bytes()); }
    fn encode_u16(val: u16, buf: &mut Vec<u8>) { buf.extend_from_slice(&val.to_le_bytes()); }
    fn encode_u8(val: u8, buf: &mut Vec<u8>) { buf.push(val); }
    fn encode_i64(val: i64, buf: &mut Vec<u8>) { buf.extend_from_slice(&val.to_le_bytes()); }
    fn encode_i128(val: i128, buf: &mut Vec<u8>) { buf.extend_from_slice(&val.to_le_bytes()); }
    fn encode_u128(val: u128, buf: &mut Vec<u8>) { buf.extend_from_slice(&val.to_le_bytes()); }
    fn encode_pubkey(val: &Pubkey, buf: &mut Vec<u8>) { buf.extend_from_slice(val.as_ref()); }

    fn sample_risk_params() -> RiskParams {
        RiskParams {
            warmup_period_slots: 100,
            maintenance_margin_bps: 500,
            initial_margin_bps: 1000,
            trading_fee_bps: 10,
            max_accounts: 64,
            new_account_fee: 1_000_000,
            risk_reduction_threshold: 0,
            maintenance_fee_per_slot: 0,
            max_crank_staleness_slots: 200,
            liquidation_fee_bps: 100,
            liquidation_fee_cap: 1_000_000_000,
            liquidation_buffer_bps: 50,
            min_liquidation_abs: 100_000,
        }
    }

    fn every_instruction() -> Vec<Instruction> {
        let pk = Pubkey::new_unique();
        vec![
            Instruction::InitMarket(InitMarketArgs {
                admin: pk,
                collateral_mint: Pubkey::new_unique(),
                index_feed_id: [7u8; 32],
                max_staleness_secs: 60,
                conf_filter_bps: 25,
                invert: true,
                unit_scale: 1000,
                initial_mark_price_e6: 142_500_000,
                risk_params: sample_risk_params(),
            }),
            Instruction::InitUser(InitUserArgs { fee_payment: 1_000_000 }),
            Instruction::InitLp(InitLpArgs {
                matcher_program: pk,
                matcher_context: Pubkey::new_unique(),
                fee_payment: 5,
            }),
            Instruction::DepositCollateral(CollateralArgs { user_idx: 3, amount: 4_000_000_000 }),
            Instruction::WithdrawCollateral(CollateralArgs { user_idx: 3, amount: u64::MAX }),
            Instruction::KeeperCrank(KeeperCrankArgs::permissionless()),
            Instruction::TradeNoCpi(TradeArgs { lp_idx: 0, user_idx: 1, size: -2_000_000_000 }),
            Instruction::LiquidateAtOracle(LiquidateAtOracleArgs { target_idx: 63 }),
            Instruction::CloseAccount(CloseAccountArgs { user_idx: 9 }),
            Instruction::TopUpInsurance(TopUpInsuranceArgs { amount: 1 }),
            Instruction::TradeCpi(TradeArgs { lp_idx: 2, user_idx: 1, size: i128::MIN }),
            Instruction::SetRiskThreshold(SetRiskThresholdArgs { new_threshold: u128::MAX }),
            Instruction::UpdateAdmin(UpdateAdminArgs { new_admin: pk }),
            Instruction::CloseSlab,
            Instruction::UpdateConfig(UpdateConfigArgs {
                funding_horizon_slots: 500,
                funding_k_bps: 100,
                funding_inv_scale_notional_e6: 1_000_000_000_000,
                funding_max_premium_bps: -500,
                funding_max_bps_per_slot: 5,
                thresh_floor: 0,
                thresh_risk_bps: 50,
                thresh_update_interval_slots: 10,
                thresh_step_bps: 500,
                thresh_alpha_bps: 1000,
                thresh_min: 0,
                thresh_max: 10_000_000_000_000_000_000,
                thresh_min_step: 1,
            }),
            Instruction::SetMaintenanceFee(SetMaintenanceFeeArgs { new_fee: 42 }),
            Instruction::SetOracleAuthority(SetOracleAuthorityArgs { new_authority: Pubkey::default() }),
            Instruction::PushOraclePrice(PushOraclePriceArgs { price_e6: 142_500_000, timestamp: -1 }),
            Instruction::SetOraclePriceCap(SetOraclePriceCapArgs { max_change_e2bps: 10_000 }),
            Instruction::ResolveMarket,
            Instruction::WithdrawInsurance,
        ]
    }

    // --- Slab decoding ---

    #[test]
    fn test_layout_offsets() {
        assert_eq!(ENGINE_OFF, 392);
        assert_eq!(LAYOUT.bitmap_words(), 1);
        assert_eq!(LAYOUT.accounts_off(), 960);
        assert_eq!(LAYOUT.slab_len(), 960 + 64 * 240);

        let prod = SlabLayout::PRODUCTION;
        assert_eq!(prod.bitmap_words(), 64);
        assert_eq!(prod.accounts_off(), ENGINE_OFF + 9136);
        assert_eq!(prod.slab_len(), 992_568);

        assert_eq!(SlabLayout::new(usize::MAX).max_accounts(), u16::MAX as usize);
        assert_eq!(SlabLayout::new(70).bitmap_words(), 2);
    }

    #[test]
    fn test_decode_header_config_engine() {
        let admin = Pubkey::new_unique();
        let (mint, vault, feed) = (Pubkey::new_unique(), Pubkey::new_unique(), Pubkey::new_unique());
        let data = SlabBuilder::new()
            .admin(&admin)
            .flags(FLAG_RESOLVED)
            .market(&mint, &vault, &feed)
            .engine(10_000_000_000, 2_500_000_000, 1234)
            .build();

        let slab = LAYOUT.decode(&data).unwrap();
        assert_eq!(slab.header.magic, MAGIC);
        assert_eq!(slab.header.version, VERSION);
        assert_eq!(slab.header.admin, admin);
        assert!(slab.resolved());
        assert!(!slab.header.paused());

        assert_eq!(slab.config.collateral_mint, mint);
        assert_eq!(slab.config.vault_pubkey, vault);
        assert_eq!(slab.config.index_feed_id, feed);
        assert_eq!(slab.config.max_staleness_secs, 60);
        assert_eq!(slab.config.conf_filter_bps, 50);
        assert!(slab.config.invert);
        assert_eq!(slab.config.funding_max_premium_bps, -500);
        assert_eq!(slab.config.thresh_max, u128::MAX);
        assert_eq!(slab.config.last_effective_price_e6, 142_500_000);
        assert!(!slab.config.has_oracle_authority());

        assert_eq!(slab.engine.vault, 10_000_000_000);
        assert_eq!(slab.engine.insurance_fund.balance, 2_500_000_000);
        assert_eq!(slab.engine.current_slot, 1234);
        assert_eq!(slab.engine.net_lp_pos, -7);
        assert_eq!(slab.engine.vault_ui(), 10.0);
        assert_eq!(slab.engine.insurance_ui(), 2.5);
        assert_eq!(slab.engine.next_account_id, 1);

        assert_eq!(slab.params.maintenance_margin_bps, 500);
        assert_eq!(slab.params.min_liquidation_abs, 1 << 100);
    }

    #[test]
    fn test_paused_flag() {
        let data = SlabBuilder::new().flags(FLAG_PAUSED).build();
        let slab = LAYOUT.decode(&data).unwrap();
        assert!(slab.header.paused());
        assert!(!slab.resolved());
    }

    #[test]
    fn test_zeroed_slab_is_invalid_magic() {
        let data = vec![0u8; LAYOUT.slab_len()];
        assert_eq!(LAYOUT.decode(&data), Err(DecodeError::InvalidMagic { found: 0 }));
    }

    #[test]
    fn test_wrong_version_rejected() {
        let mut data = SlabBuilder::new().build();
        layout::write_u32(&mut data, header::VERSION, 2, "version").unwrap();
        assert_eq!(LAYOUT.decode(&data), Err(DecodeError::UnsupportedVersion { found: 2 }));
    }

    #[test]
    fn test_truncated_buffers_rejected() {
        let owner = Pubkey::new_unique();
        let full = SlabBuilder::new().account(5, AccountFixture::user(owner)).build();

        for len in [0, 7, 40, 71] {
            match LAYOUT.decode(&full[..len]) {
                Err(DecodeError::OutOfBounds(OutOfBounds { field: "header", buf_len, .. })) => assert_eq!(buf_len, len),
                other => panic!("len {len}: unexpected {other:?}"),
            }
        }

        // Header intact, rest cut short.
        for len in [ENGINE_OFF + 100, LAYOUT.account_off(5) + 100, full.len() - 1] {
            let cut = &full[..len];
            let short = DecodeError::InvalidSlabLen { expected: LAYOUT.slab_len(), found: len };
            assert_eq!(LAYOUT.decode(cut), Err(short.clone()));
            assert_eq!(LAYOUT.decode_used_indices(cut), Err(short.clone()));
            assert_eq!(LAYOUT.decode_account_at(cut, 5), Err(short.clone()));
            assert_eq!(LAYOUT.decode_all_accounts(cut), Err(short));
        }
    }

    #[test]
    fn test_slab_length_must_match_layout() {
        let owner = Pubkey::new_unique();
        let small = SlabBuilder::new().account(5, AccountFixture::user(owner)).build();
        let prod = SlabLayout::PRODUCTION;
        let wrong_capacity = DecodeError::InvalidSlabLen { expected: prod.slab_len(), found: small.len() };

        // A 64-slot slab read with the 4096-slot layout would treat the freelist as bitmap.
        assert_eq!(prod.decode(&small), Err(wrong_capacity.clone()));
        assert_eq!(prod.decode_used_indices(&small), Err(wrong_capacity.clone()));
        assert_eq!(prod.decode_account_at(&small, 64), Err(wrong_capacity.clone()));
        assert_eq!(prod.find_user_account(&small, &owner), Err(wrong_capacity));

        let mut padded = small.clone();
        padded.extend_from_slice(&[0xa5; 4096]);
        let too_long = DecodeError::InvalidSlabLen { expected: LAYOUT.slab_len(), found: padded.len() };
        assert_eq!(LAYOUT.decode(&padded), Err(too_long.clone()));
        assert_eq!(LAYOUT.decode_engine(&padded), Err(too_long.clone()));
        assert_eq!(LAYOUT.decode_used_indices(&padded), Err(too_long));

        assert_eq!(LAYOUT.check_len(&small), Ok(()));
        assert_eq!(LAYOUT.decode_used_indices(&small).unwrap(), vec![5]);
    }

    #[test]
    fn test_used_indices_follow_bitmap() {
        let data = SlabBuilder::new()
            .account(0, AccountFixture::user(Pubkey::new_unique()))
            .account(3, AccountFixture::user(Pubkey::new_unique()))
            .account(63, AccountFixture::user(Pubkey::new_unique()))
            .build();
        assert_eq!(LAYOUT.decode_used_indices(&data).unwrap(), vec![0, 3, 63]);
        assert_eq!(LAYOUT.decode(&data).unwrap().engine.num_used_accounts, 3);
        assert_eq!(LAYOUT.decode_all_accounts(&data).unwrap().len(), 3);
    }

    #[test]
    fn test_bitmap_bits_past_capacity_ignored() {
        let layout = SlabLayout::new(70);
        let mut data = SlabBuilder::with_layout(layout).account(69, AccountFixture::user(Pubkey::new_unique())).build();
        let second_word = layout.bitmap_off() + 8;
        let word = layout::read_u64(&data, second_word, "used").unwrap();
        layout::write_u64(&mut data, second_word, word | (1 << 40), "used").unwrap();

        assert_eq!(layout.decode_used_indices(&data).unwrap(), vec![69]);
        assert_eq!(layout.decode_account_at(&data, 104).unwrap(), None);
        assert_eq!(layout.decode_account_at(&data, u16::MAX).unwrap(), None);
    }

    #[test]
    fn test_stale_slot_is_never_parsed() {
        // Tag 7 is not a valid kind; parsing the free slot would fail.
        let data = SlabBuilder::new().account(1, AccountFixture::user(Pubkey::new_unique())).stale(2, 7).build();
        assert_eq!(LAYOUT.decode_account_at(&data, 2).unwrap(), None);
        assert_eq!(LAYOUT.decode_all_accounts(&data).unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_account_kind_fails() {
        let data = SlabBuilder::new()
            .account(4, AccountFixture { kind: 2, ..AccountFixture::user(Pubkey::new_unique()) })
            .build();
        let offset = LAYOUT.account_off(4) + account::KIND;
        assert_eq!(
            LAYOUT.decode_account_at(&data, 4),
            Err(DecodeError::InvalidEnumTag { field: "account.kind", offset, tag: 2 })
        );
    }

    #[test]
    fn test_used_index_invariant_random_bitmaps() {
        let mut rng = XorShiftRng::seed_from_u64(0xdecaf);
        for _ in 0..50 {
            let mut b = SlabBuilder::new();
            for idx in 0..LAYOUT.max_accounts() {
                if rng.gen_bool(0.3) {
                    b = b.account(idx, AccountFixture::user(Pubkey::new_unique()));
                } else if rng.gen_bool(0.5) {
                    b = b.stale(idx, rng.gen_range(2..=u8::MAX));
                }
            }
            let data = b.build();
            let used = LAYOUT.decode_used_indices(&data).unwrap();
            assert!(used.windows(2).all(|w| w[0] < w[1]));
            for idx in 0..=LAYOUT.max_accounts() as u16 + 8 {
                let acct = LAYOUT.decode_account_at(&data, idx).unwrap();
                assert_eq!(acct.is_some(), used.contains(&idx), "slot {idx}");
            }
        }
    }

    #[test]
    fn test_pnl_sign_recovery() {
        let data = SlabBuilder::new()
            .account(0, AccountFixture::user(Pubkey::new_unique()).pnl(-1000))
            .account(1, AccountFixture::user(Pubkey::new_unique()).pnl(1000))
            .build();
        assert_eq!(LAYOUT.decode_account_at(&data, 0).unwrap().unwrap().pnl, -1000);
        assert_eq!(LAYOUT.decode_account_at(&data, 1).unwrap().unwrap().pnl, 1000);

        assert_eq!(recover_signed((1u128 << 64) - 1000, 64), -1000);
        assert_eq!(recover_signed(1000, 64), 1000);
        assert_eq!(recover_signed(1 << 63, 64), 1 << 63);
        assert_eq!(recover_signed((1 << 63) + 1, 64), i64::MIN as i128 + 1);
        assert_eq!(recover_signed(0xff, 8), -1);
        assert_eq!(recover_signed(u128::MAX, 128), -1);
        assert_eq!(recover_signed(5, 0), 0);
    }

    #[test]
    fn test_capital_and_position_scaling() {
        let owner = Pubkey::new_unique();
        let data = SlabBuilder::new()
            .account(
                7,
                AccountFixture::user(owner).capital(4_000_000_000).position(-2_000_000_000, 142_500_000),
            )
            .build();
        let acct = LAYOUT.decode_account_at(&data, 7).unwrap().unwrap();
        assert_eq!(acct.owner, owner);
        assert_eq!(acct.kind, AccountKind::User);
        assert_eq!(acct.capital_ui(), 4.0);
        assert_eq!(acct.position_ui(), -2.0);
        assert_eq!(acct.entry_price_ui(), 142.5);
        assert!(acct.has_position());
    }

    #[test]
    fn test_decode_is_idempotent_and_leaves_input_untouched() {
        let data = SlabBuilder::new()
            .market(&Pubkey::new_unique(), &Pubkey::new_unique(), &Pubkey::new_unique())
            .account(2, AccountFixture::user(Pubkey::new_unique()).capital(9))
            .build();
        let before = data.clone();
        let a = (LAYOUT.decode(&data).unwrap(), LAYOUT.decode_all_accounts(&data).unwrap());
        let b = (LAYOUT.decode(&data).unwrap(), LAYOUT.decode_all_accounts(&data).unwrap());
        assert_eq!(a, b);
        assert_eq!(data, before);
    }

    #[test]
    fn test_find_user_account_skips_lp() {
        let owner = Pubkey::new_unique();
        let data = SlabBuilder::new()
            .account(0, AccountFixture::lp(owner, Pubkey::new_unique(), Pubkey::new_unique()))
            .account(1, AccountFixture::user(Pubkey::new_unique()))
            .account(5, AccountFixture::user(owner).capital(1))
            .build();
        let (idx, acct) = LAYOUT.find_user_account(&data, &owner).unwrap().unwrap();
        assert_eq!(idx, 5);
        assert!(acct.is_user());
        assert_eq!(LAYOUT.find_user_account(&data, &Pubkey::new_unique()).unwrap(), None);
        assert!(LAYOUT.decode_account_at(&data, 0).unwrap().unwrap().is_lp());
    }

    // --- Layout primitives ---

    #[test]
    fn test_primitive_readers_bounds() {
        let buf = [1u8, 2, 3, 4];
        assert_eq!(layout::read_u16(&buf, 2, "x").unwrap(), 0x0403);
        assert_eq!(layout::read_i8(&[0xff], 0, "x").unwrap(), -1);
        assert!(layout::read_bool(&buf, 0, "x").unwrap());
        assert_eq!(
            layout::read_u32(&buf, 1, "x"),
            Err(OutOfBounds { field: "x", offset: 1, len: 4, buf_len: 4 })
        );
        assert!(layout::read_u8(&buf, usize::MAX, "x").is_err());
        assert!(layout::bytes_at(&buf, usize::MAX, 2, "x").is_err());
        let mut out = [0u8; 4];
        assert!(layout::write_u64(&mut out, 0, 1, "x").is_err());
        assert_eq!(out, [0u8; 4]);
    }

    #[test]
    fn test_cursor_and_writer() {
        let key = Pubkey::new_unique();
        let mut w = ByteWriter::with_tag(9);
        w.put_u16(0xbeef).put_i128(-2).put_pubkey(&key).put_bool(true);
        assert_eq!(w.len(), 1 + 2 + 16 + 32 + 1);
        let bytes = w.into_inner();

        let mut c = Cursor::new(&bytes);
        assert_eq!(c.read_u8("tag").unwrap(), 9);
        assert_eq!(c.read_u16("a").unwrap(), 0xbeef);
        assert_eq!(c.read_i128("b").unwrap(), -2);
        assert_eq!(c.read_pubkey("c").unwrap(), key);
        assert!(c.read_bool("d").unwrap());
        assert_eq!(c.remaining(), 0);
        assert_eq!(c.position(), bytes.len());
        assert!(c.read_u8("e").is_err());
    }

    // --- Instruction encoding ---

    #[test]
    fn test_init_user_fee_encoding() {
        assert_eq!(encode_init_user(&InitUserArgs { fee_payment: 0 }), vec![1, 0, 0, 0, 0, 0, 0, 0, 0]);

        let mut expected = vec![1u8];
        encode_u64(1_000_000, &mut expected);
        assert_eq!(encode_init_user(&InitUserArgs { fee_payment: 1_000_000 }), expected);
    }

    #[test]
    fn test_encoders_match_hand_built_payloads() {
        let matcher = Pubkey::new_unique();
        let ctx = Pubkey::new_unique();

        let mut expected = vec![2u8];
        encode_pubkey(&matcher, &mut expected);
        encode_pubkey(&ctx, &mut expected);
        encode_u64(77, &mut expected);
        let args = InitLpArgs { matcher_program: matcher, matcher_context: ctx, fee_payment: 77 };
        assert_eq!(encode_init_lp(&args), expected);

        let mut expected = vec![3u8];
        encode_u16(12, &mut expected);
        encode_u64(4_000_000_000, &mut expected);
        assert_eq!(encode_deposit_collateral(&CollateralArgs { user_idx: 12, amount: 4_000_000_000 }), expected);

        let mut expected = vec![10u8];
        encode_u16(0, &mut expected);
        encode_u16(1, &mut expected);
        encode_i128(-2_000_000_000, &mut expected);
        let trade = encode_trade_cpi(&TradeArgs { lp_idx: 0, user_idx: 1, size: -2_000_000_000 });
        assert_eq!(trade, expected);
        // 128-bit size always occupies 16 bytes, sign-extended.
        assert_eq!(trade.len(), 21);
        assert!(trade[9..21].iter().all(|&b| b == 0xff));

        let mut expected = vec![5u8];
        encode_u16(u16::MAX, &mut expected);
        encode_u8(0, &mut expected);
        assert_eq!(encode_keeper_crank(&KeeperCrankArgs::permissionless()), expected);

        let mut expected = vec![17u8];
        encode_u64(142_500_000, &mut expected);
        encode_i64(1_700_000_000, &mut expected);
        let args = PushOraclePriceArgs { price_e6: 142_500_000, timestamp: 1_700_000_000 };
        assert_eq!(encode_push_oracle_price(&args), expected);

        let mut expected = vec![15u8];
        encode_u128(1 << 70, &mut expected);
        assert_eq!(encode_set_maintenance_fee(&SetMaintenanceFeeArgs { new_fee: 1 << 70 }), expected);

        assert_eq!(encode_close_slab(), vec![13]);
        assert_eq!(encode_resolve_market(), vec![19]);
        assert_eq!(encode_withdraw_insurance(), vec![20]);
    }

    #[test]
    fn test_payload_lengths() {
        for ix in every_instruction() {
            let expected = match ix {
                Instruction::InitMarket(_) => 264,
                Instruction::InitUser(_) | Instruction::TopUpInsurance(_) => 9,
                Instruction::InitLp(_) => 73,
                Instruction::DepositCollateral(_) | Instruction::WithdrawCollateral(_) => 11,
                Instruction::KeeperCrank(_) => 4,
                Instruction::TradeNoCpi(_) | Instruction::TradeCpi(_) => 21,
                Instruction::LiquidateAtOracle(_) | Instruction::CloseAccount(_) => 3,
                Instruction::SetRiskThreshold(_) | Instruction::SetMaintenanceFee(_) => 17,
                Instruction::UpdateAdmin(_) | Instruction::SetOracleAuthority(_) => 33,
                Instruction::UpdateConfig(_) => 145,
                Instruction::PushOraclePrice(_) => 17,
                Instruction::SetOraclePriceCap(_) => 9,
                Instruction::CloseSlab | Instruction::ResolveMarket | Instruction::WithdrawInsurance => 1,
            };
            let bytes = ix.encode();
            assert_eq!(bytes.len(), expected, "{}", ix.name());
            assert_eq!(bytes[0], ix.tag());
        }
    }

    #[test]
    fn test_decode_inverts_encode() {
        for (tag, ix) in every_instruction().into_iter().enumerate() {
            assert_eq!(ix.tag() as usize, tag);
            let bytes = ix.encode();
            assert_eq!(Instruction::decode(&bytes).unwrap(), ix);
            assert_eq!(ix.encode(), bytes);
        }
    }

    #[test]
    fn test_decode_rejects_bad_payloads() {
        assert_eq!(Instruction::decode(&[]), Err(DecodeError::EmptyInstruction));
        assert_eq!(Instruction::decode(&[21]), Err(DecodeError::UnknownInstruction(21)));
        assert_eq!(Instruction::decode(&[255, 0, 0]), Err(DecodeError::UnknownInstruction(255)));

        let short = &encode_deposit_collateral(&CollateralArgs { user_idx: 1, amount: 2 })[..6];
        match Instruction::decode(short) {
            Err(DecodeError::OutOfBounds(e)) => assert_eq!(e.field, "amount"),
            other => panic!("unexpected {other:?}"),
        }

        // Trailing bytes are ignored, as the program does.
        let mut long = encode_init_user(&InitUserArgs { fee_payment: 3 });
        long.extend_from_slice(&[1, 2, 3]);
        assert_eq!(Instruction::decode(&long).unwrap(), Instruction::InitUser(InitUserArgs { fee_payment: 3 }));
    }

    #[test]
    fn test_update_config_from_market() {
        let data =
            SlabBuilder::new().market(&Pubkey::new_unique(), &Pubkey::new_unique(), &Pubkey::new_unique()).build();
        let cfg = LAYOUT.decode(&data).unwrap().config;
        let mut args = UpdateConfigArgs::from_config(&cfg);
        assert_eq!(args.funding_max_premium_bps, -500);
        args.funding_k_bps = 250;
        match Instruction::decode(&encode_update_config(&args)).unwrap() {
            Instruction::UpdateConfig(decoded) => {
                assert_eq!(decoded.funding_k_bps, 250);
                assert_eq!(decoded.thresh_max, u128::MAX);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    // --- Argument validation ---

    #[test]
    fn test_index_validation() {
        assert_eq!(ix::parse_index(" 12 ", "user_idx").unwrap(), 12);
        assert_eq!(ix::parse_index("65534", "user_idx").unwrap(), 65534);
        assert!(matches!(
            ix::parse_index("65535", "user_idx"),
            Err(EncodeError::OutOfRange { field: "user_idx", .. })
        ));
        assert!(ix::parse_index("-1", "user_idx").is_err());
        assert!(ix::parse_index("abc", "user_idx").is_err());
        assert_eq!(ix::checked_index(7, "lp_idx").unwrap(), 7);
        assert!(ix::checked_index(70_000, "lp_idx").is_err());
    }

    #[test]
    fn test_numeric_validation() {
        assert_eq!(ix::parse_u64("18446744073709551615", "amount").unwrap(), u64::MAX);
        assert!(matches!(ix::parse_u64("18446744073709551616", "amount"), Err(EncodeError::OutOfRange { .. })));
        assert!(ix::parse_u64("-5", "amount").is_err());
        assert_eq!(ix::parse_i128("-2000000000", "size").unwrap(), -2_000_000_000);
        assert!(ix::parse_i128("170141183460469231731687303715884105728", "size").is_err());
        assert!(ix::parse_i128("1.5", "size").is_err());
    }

    #[test]
    fn test_push_price_from_ui() {
        let args = PushOraclePriceArgs::from_ui_price(142.5, 1_700_000_000).unwrap();
        assert_eq!(args.price_e6, 142_500_000);
        assert_eq!(PushOraclePriceArgs::from_ui_price(0.000001, 0).unwrap().price_e6, 1);
        assert!(PushOraclePriceArgs::from_ui_price(-1.0, 0).is_err());
        assert!(PushOraclePriceArgs::from_ui_price(f64::NAN, 0).is_err());
        assert!(PushOraclePriceArgs::from_ui_price(f64::INFINITY, 0).is_err());
        assert!(PushOraclePriceArgs::from_ui_price(1e20, 0).is_err());
    }

    // --- Account metas ---

    #[test]
    fn test_arity_enforced() {
        let keys: Vec<Pubkey> = (0..7).map(|_| Pubkey::new_unique()).collect();
        let err = build_account_metas(&accounts::TRADE_CPI, &keys).unwrap_err();
        assert_eq!(err.instruction, "TradeCpi");
        assert_eq!(err.expected, 8);
        assert_eq!(err.got, 7);

        let keys: Vec<Pubkey> = (0..9).map(|_| Pubkey::new_unique()).collect();
        assert!(build_account_metas(&accounts::TRADE_CPI, &keys).is_err());
        assert!(build_account_metas(&accounts::INIT_MARKET, &keys).is_ok());
    }

    #[test]
    fn test_trade_cpi_meta_flags() {
        let keys: Vec<Pubkey> = (0..8).map(|_| Pubkey::new_unique()).collect();
        let metas = build_account_metas(&accounts::TRADE_CPI, &keys).unwrap();
        let flags: Vec<(bool, bool)> = metas.iter().map(|m| (m.is_signer, m.is_writable)).collect();
        assert_eq!(
            flags,
            vec![
                (true, true),   // user
                (false, false), // lpOwner
                (false, true),  // slab
                (false, false), // clock
                (false, false), // oracle
                (false, false), // matcherProg
                (false, true),  // matcherCtx
                (false, false), // lpPda
            ]
        );
        for (meta, key) in metas.iter().zip(&keys) {
            assert_eq!(meta.pubkey, *key);
        }
    }

    #[test]
    fn test_schemas_cover_every_instruction() {
        for ix in every_instruction() {
            let schema = ix.account_schema();
            assert!(!schema.is_empty(), "{}", ix.name());
            let slab = schema.position("slab").unwrap();
            assert!(schema.accounts[slab].writable, "{}", ix.name());
            let first = schema.accounts[0];
            assert_eq!(first.signer, first.name != "unused", "{}", ix.name());
        }
        assert_eq!(accounts::WITHDRAW_COLLATERAL.len(), 8);
        assert_eq!(accounts::CLOSE_ACCOUNT.accounts, accounts::WITHDRAW_COLLATERAL.accounts);
        assert_eq!(accounts::WITHDRAW_COLLATERAL.position("oracleIdx"), Some(7));
        assert_eq!(accounts::INIT_MARKET.len(), 9);
        assert_eq!(accounts::TRADE_NO_CPI.accounts.iter().filter(|a| a.signer).count(), 2);
    }

    #[test]
    fn test_pdas_deterministic() {
        let program = Pubkey::new_unique();
        let slab = Pubkey::new_unique();

        let (vault_auth, bump) = derive_vault_authority(&program, &slab);
        assert_eq!(derive_vault_authority(&program, &slab), (vault_auth, bump));
        assert_eq!(Pubkey::create_program_address(&[b"vault", slab.as_ref(), &[bump]], &program).unwrap(), vault_auth);

        let (lp0, _) = derive_lp_pda(&program, &slab, 0);
        let (lp1, bump1) = derive_lp_pda(&program, &slab, 1);
        assert_ne!(lp0, lp1);
        assert_eq!(derive_lp_pda(&program, &slab, 1), (lp1, bump1));
        assert_eq!(
            Pubkey::create_program_address(&[b"lp", slab.as_ref(), &1u16.to_le_bytes(), &[bump1]], &program).unwrap(),
            lp1
        );

        let wallet = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let ata = derive_associated_token_address(&wallet, &mint);
        assert_eq!(ata, derive_associated_token_address(&wallet, &mint));
        assert_ne!(ata, derive_associated_token_address(&wallet, &Pubkey::new_unique()));
        assert_eq!(well_known::TOKEN_PROGRAM, spl_token::ID);
        assert_eq!(well_known::CLOCK, solana_program::sysvar::clock::ID);
    }

    // --- Error translation ---

    #[test]
    fn test_translate_offset_code() {
        let logs = [
            "Program 11111111111111111111111111111111 invoke [1]",
            "Program Perc1111111111111111111111111111111111111 failed: custom program error: 0x1771",
        ];
        let t = parse_error_from_logs(&logs).unwrap();
        assert_eq!(t.code, 0x1771);
        assert_eq!(t.error, PercolatorError::InvalidVersion);
        assert_eq!(t.name, "InvalidVersion");
        assert!(t.hint.is_some());
    }

    #[test]
    fn test_translate_raw_and_decimal_codes() {
        assert_eq!(translate_code(6).unwrap().name, "OracleStale");
        assert_eq!(translate_code(6006).unwrap().error, PercolatorError::OracleStale);
        assert_eq!(extract_error_code("failed: custom program error: 0xe"), Some(14));
        assert_eq!(extract_error_code("failed: custom program error: 14"), Some(14));
        assert_eq!(extract_error_code("failed: custom program error: 0x1771 extra"), Some(0x1771));
        assert_eq!(translate_code(14).unwrap().error, PercolatorError::EngineUndercollateralized);
        assert_eq!(translate_code(27).unwrap().name, "HyperpTradeNoCpiDisabled");
        assert_eq!(translate_code(28), None);
        assert_eq!(translate_code(5999), None);
        assert_eq!(translate_code(6028), None);
        assert_eq!(translate_code(18).unwrap().hint, None);
    }

    #[test]
    fn test_translate_nothing_recognisable() {
        let empty: [&str; 0] = [];
        assert_eq!(parse_error_from_logs(&empty), None);
        assert_eq!(parse_error_from_logs(&["Program log: ok"]), None);
        assert_eq!(parse_error_from_logs(&["custom program error: 0xzz"]), None);
        assert_eq!(parse_error_from_logs(&["custom program error: 0x9999"]), None);
        // Later recognisable lines still win over earlier garbage.
        let logs = ["custom program error: nope", "custom program error: 0x3"];
        assert_eq!(parse_error_from_logs(&logs).unwrap().error, PercolatorError::NotInitialized);
    }

    #[test]
    fn test_execution_error_display() {
        let logs = vec!["Program x failed: custom program error: 0x1771".to_string()];
        let err = ProgramExecutionError::from_failure("InstructionError(0, Custom(6001))", logs.clone());
        assert_eq!(err.to_string(), "InvalidVersion (0x1771)");
        assert_eq!(err.logs(), &logs[..]);
        assert!(err.hint().is_some());

        let err = ProgramExecutionError::from_failure("BlockhashNotFound", vec![]);
        assert_eq!(err.to_string(), "transaction failed: BlockhashNotFound");
        assert_eq!(err.hint(), None);
    }

    // --- Units ---

    #[test]
    fn test_units_formatting() {
        assert_eq!(units::format_token_amount(1_234_567_890_000, 9, 4), "1,234.5678");
        assert_eq!(units::format_token_amount(-2_000_000_000, 9, 4), "-2");
        assert_eq!(units::format_token_amount(500_000, 9, 4), "0.0005");
        assert_eq!(units::format_token_amount(i128::MIN, 9, 2).chars().next(), Some('-'));
        assert_eq!(units::format_price_e6(142_500_000), "142.50");
        assert_eq!(units::bps_to_percent(50), "0.50%");
        assert_eq!(units::bps_to_percent(10_000), "100.00%");
        assert_eq!(units::signed_to_ui(-1_500_000_000, 9), -1.5);
        assert_eq!(units::from_ui(4.0, 9, "amount").unwrap(), 4_000_000_000);
    }
}
