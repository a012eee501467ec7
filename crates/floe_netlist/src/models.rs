//! The standard cell-model library and fast kind predicates.
//!
//! Every primitive the packer, promoter, placer and router understand is
//! created up front with its fixed port ordering and default parameters.
//! [`Models`] caches the ids and answers "what kind of instance is this".

use crate::constant::{Const, Value};
use crate::design::{Design, Direction, NodeRef};
use crate::ids::{InstanceId, ModelId};
use floe_common::Result;

fn in_port(d: &mut Design, m: ModelId, name: &str, undriven: Value) {
    d.add_port(NodeRef::Model(m), name, Direction::In, undriven);
}

fn out_port(d: &mut Design, m: ModelId, name: &str) {
    d.add_port(NodeRef::Model(m), name, Direction::Out, Value::X);
}

fn inout_port(d: &mut Design, m: ModelId, name: &str) {
    d.add_port(NodeRef::Model(m), name, Direction::Inout, Value::X);
}

fn io_ports_and_params(d: &mut Design, m: ModelId) {
    in_port(d, m, "LATCH_INPUT_VALUE", Value::Zero);
    in_port(d, m, "CLOCK_ENABLE", Value::One);
    in_port(d, m, "INPUT_CLK", Value::Zero);
    in_port(d, m, "OUTPUT_CLK", Value::Zero);
    in_port(d, m, "OUTPUT_ENABLE", Value::Zero);
    in_port(d, m, "D_OUT_0", Value::Zero);
    in_port(d, m, "D_OUT_1", Value::Zero);
    out_port(d, m, "D_IN_0");
    out_port(d, m, "D_IN_1");

    d.set_model_param(m, "PIN_TYPE", Const::bits_of(6, 0));
    d.set_model_param(m, "PULLUP", Const::bits_of(1, 0));
    d.set_model_param(m, "NEG_TRIGGER", Const::bits_of(1, 0));
    d.set_model_param(m, "IO_STANDARD", Const::str("SB_LVCMOS"));
}

fn pll_common(d: &mut Design, m: ModelId, dual: bool) {
    in_port(d, m, "RESETB", Value::Zero);
    in_port(d, m, "BYPASS", Value::Zero);
    in_port(d, m, "EXTFEEDBACK", Value::Zero);
    for i in 0..8 {
        in_port(d, m, &format!("DYNAMICDELAY[{i}]"), Value::Zero);
    }
    in_port(d, m, "LATCHINPUTVALUE", Value::Zero);
    in_port(d, m, "SCLK", Value::Zero);
    in_port(d, m, "SDI", Value::Zero);
    in_port(d, m, "SDO", Value::Zero);
    out_port(d, m, "LOCK");
    if dual {
        out_port(d, m, "PLLOUTGLOBALA");
        out_port(d, m, "PLLOUTCOREA");
        out_port(d, m, "PLLOUTGLOBALB");
        out_port(d, m, "PLLOUTCOREB");
    } else {
        out_port(d, m, "PLLOUTGLOBAL");
        out_port(d, m, "PLLOUTCORE");
    }

    d.set_model_param(m, "FEEDBACK_PATH", Const::str("SIMPLE"));
    d.set_model_param(m, "DELAY_ADJUSTMENT_MODE_FEEDBACK", Const::str("FIXED"));
    d.set_model_param(m, "FDA_FEEDBACK", Const::bits_of(4, 0));
    d.set_model_param(m, "DELAY_ADJUSTMENT_MODE_RELATIVE", Const::str("FIXED"));
    d.set_model_param(m, "FDA_RELATIVE", Const::bits_of(4, 0));
    d.set_model_param(m, "SHIFTREG_DIV_MODE", Const::bits_of(1, 0));
    if dual {
        d.set_model_param(m, "PLLOUT_SELECT_PORTA", Const::str("GENCLK"));
        d.set_model_param(m, "PLLOUT_SELECT_PORTB", Const::str("GENCLK"));
        d.set_model_param(m, "ENABLE_ICEGATE_PORTA", Const::bits_of(1, 0));
        d.set_model_param(m, "ENABLE_ICEGATE_PORTB", Const::bits_of(1, 0));
    } else {
        d.set_model_param(m, "PLLOUT_SELECT", Const::str("GENCLK"));
        d.set_model_param(m, "ENABLE_ICEGATE", Const::bits_of(1, 0));
    }
    d.set_model_param(m, "DIVR", Const::bits_of(4, 0));
    d.set_model_param(m, "DIVF", Const::bits_of(7, 0));
    d.set_model_param(m, "DIVQ", Const::bits_of(3, 0));
    d.set_model_param(m, "FILTER_RANGE", Const::bits_of(3, 0));
    d.set_model_param(m, "EXTERNAL_DIVIDE_FACTOR", Const::bits_of(32, 1));
}

/// Creates every standard model in a fresh design.
pub fn create_standard_models(d: &mut Design) -> Result<()> {
    let lc = d.add_model("ICESTORM_LC")?;
    in_port(d, lc, "I0", Value::Zero);
    in_port(d, lc, "I1", Value::Zero);
    in_port(d, lc, "I2", Value::Zero);
    in_port(d, lc, "I3", Value::Zero);
    in_port(d, lc, "CIN", Value::Zero);
    in_port(d, lc, "CLK", Value::Zero);
    in_port(d, lc, "CEN", Value::One);
    in_port(d, lc, "SR", Value::Zero);
    out_port(d, lc, "LO");
    out_port(d, lc, "O");
    out_port(d, lc, "COUT");
    d.set_model_param(lc, "LUT_INIT", Const::bits_of(1, 0));
    d.set_model_param(lc, "NEG_CLK", Const::bits_of(1, 0));
    d.set_model_param(lc, "CARRY_ENABLE", Const::bits_of(1, 0));
    d.set_model_param(lc, "DFF_ENABLE", Const::bits_of(1, 0));
    d.set_model_param(lc, "SET_NORESET", Const::bits_of(1, 0));
    d.set_model_param(lc, "SET_ASYNC", Const::bits_of(1, 0));
    d.set_model_param(lc, "ASYNC_SR", Const::bits_of(1, 0));

    let io = d.add_model("SB_IO")?;
    inout_port(d, io, "PACKAGE_PIN");
    io_ports_and_params(d, io);

    let gb = d.add_model("SB_GB")?;
    in_port(d, gb, "USER_SIGNAL_TO_GLOBAL_BUFFER", Value::X);
    out_port(d, gb, "GLOBAL_BUFFER_OUTPUT");

    let gb_io = d.add_model("SB_GB_IO")?;
    inout_port(d, gb_io, "PACKAGE_PIN");
    out_port(d, gb_io, "GLOBAL_BUFFER_OUTPUT");
    io_ports_and_params(d, gb_io);

    let io_i3c = d.add_model("SB_IO_I3C")?;
    inout_port(d, io_i3c, "PACKAGE_PIN");
    io_ports_and_params(d, io_i3c);
    in_port(d, io_i3c, "PU_ENB", Value::Zero);
    in_port(d, io_i3c, "WEAK_PU_ENB", Value::Zero);
    d.set_model_param(io_i3c, "WEAK_PULLUP", Const::bits_of(1, 0));

    // The official SB_IO_OD has unsystematic port naming; readers rewrite
    // instances onto the `_A` variant, which follows the SB_IO scheme.
    let io_od = d.add_model("SB_IO_OD")?;
    inout_port(d, io_od, "PACKAGEPIN");
    in_port(d, io_od, "LATCHINPUTVALUE", Value::Zero);
    in_port(d, io_od, "CLOCKENABLE", Value::One);
    in_port(d, io_od, "INPUTCLK", Value::Zero);
    in_port(d, io_od, "OUTPUTCLK", Value::Zero);
    in_port(d, io_od, "OUTPUTENABLE", Value::Zero);
    in_port(d, io_od, "DOUT0", Value::Zero);
    in_port(d, io_od, "DOUT1", Value::Zero);
    out_port(d, io_od, "DIN0");
    out_port(d, io_od, "DIN1");
    d.set_model_param(io_od, "PIN_TYPE", Const::bits_of(6, 0));
    d.set_model_param(io_od, "PULLUP", Const::bits_of(1, 0));
    d.set_model_param(io_od, "NEG_TRIGGER", Const::bits_of(1, 0));
    d.set_model_param(io_od, "IO_STANDARD", Const::str("SB_LVCMOS"));

    let io_od_a = d.add_model("SB_IO_OD_A")?;
    inout_port(d, io_od_a, "PACKAGE_PIN");
    io_ports_and_params(d, io_od_a);

    let lut = d.add_model("SB_LUT4")?;
    out_port(d, lut, "O");
    in_port(d, lut, "I0", Value::Zero);
    in_port(d, lut, "I1", Value::Zero);
    in_port(d, lut, "I2", Value::Zero);
    in_port(d, lut, "I3", Value::Zero);
    d.set_model_param(lut, "LUT_INIT", Const::bits_of(1, 0));

    let carry = d.add_model("SB_CARRY")?;
    out_port(d, carry, "CO");
    in_port(d, carry, "I0", Value::Zero);
    in_port(d, carry, "I1", Value::Zero);
    in_port(d, carry, "CI", Value::Zero);

    // The SB_DFF matrix: {N?}{E?}{,SR,R,SS,S}.
    for neg_clk in 0..2 {
        for cen in 0..2 {
            for sr in 0..5 {
                let mut name = String::from("SB_DFF");
                if neg_clk == 1 {
                    name.push('N');
                }
                if cen == 1 {
                    name.push('E');
                }
                name.push_str(["", "SR", "R", "SS", "S"][sr]);

                let dff = d.add_model(&name)?;
                out_port(d, dff, "Q");
                in_port(d, dff, "C", Value::Zero);
                if cen == 1 {
                    in_port(d, dff, "E", Value::One);
                }
                match sr {
                    1 | 2 => in_port(d, dff, "R", Value::Zero),
                    3 | 4 => in_port(d, dff, "S", Value::Zero),
                    _ => {}
                }
                in_port(d, dff, "D", Value::Zero);
            }
        }
    }

    for nr in 0..2 {
        for nw in 0..2 {
            let mut name = String::from("SB_RAM40_4K");
            if nr == 1 {
                name.push_str("NR");
            }
            if nw == 1 {
                name.push_str("NW");
            }
            let bram = d.add_model(&name)?;
            for i in 0..16 {
                out_port(d, bram, &format!("RDATA[{i}]"));
            }
            for i in 0..11 {
                in_port(d, bram, &format!("RADDR[{i}]"), Value::Zero);
            }
            for i in 0..11 {
                in_port(d, bram, &format!("WADDR[{i}]"), Value::Zero);
            }
            for i in 0..16 {
                in_port(d, bram, &format!("MASK[{i}]"), Value::Zero);
            }
            for i in 0..16 {
                in_port(d, bram, &format!("WDATA[{i}]"), Value::Zero);
            }
            in_port(d, bram, "RCLKE", Value::One);
            in_port(d, bram, if nr == 1 { "RCLKN" } else { "RCLK" }, Value::Zero);
            in_port(d, bram, "RE", Value::Zero);
            in_port(d, bram, "WCLKE", Value::One);
            in_port(d, bram, if nw == 1 { "WCLKN" } else { "WCLK" }, Value::Zero);
            in_port(d, bram, "WE", Value::Zero);
            for i in 0..16u32 {
                d.set_model_param(
                    bram,
                    &format!("INIT_{}", floe_common::hexdigit(i, 'A')),
                    Const::bits_of(256, 0),
                );
            }
            d.set_model_param(bram, "READ_MODE", Const::bits_of(2, 0));
            d.set_model_param(bram, "WRITE_MODE", Const::bits_of(2, 0));
        }
    }

    let pll_core = d.add_model("SB_PLL40_CORE")?;
    in_port(d, pll_core, "REFERENCECLK", Value::Zero);
    pll_common(d, pll_core, false);

    let pll_pad = d.add_model("SB_PLL40_PAD")?;
    in_port(d, pll_pad, "PACKAGEPIN", Value::X);
    pll_common(d, pll_pad, false);

    let pll_2_pad = d.add_model("SB_PLL40_2_PAD")?;
    in_port(d, pll_2_pad, "PACKAGEPIN", Value::X);
    pll_common(d, pll_2_pad, true);

    let pll_2f_core = d.add_model("SB_PLL40_2F_CORE")?;
    in_port(d, pll_2f_core, "REFERENCECLK", Value::Zero);
    pll_common(d, pll_2f_core, true);

    let pll_2f_pad = d.add_model("SB_PLL40_2F_PAD")?;
    in_port(d, pll_2f_pad, "PACKAGEPIN", Value::X);
    pll_common(d, pll_2f_pad, true);

    let warmboot = d.add_model("SB_WARMBOOT")?;
    in_port(d, warmboot, "BOOT", Value::Zero);
    in_port(d, warmboot, "S1", Value::Zero);
    in_port(d, warmboot, "S0", Value::Zero);

    let tbuf = d.add_model("$_TBUF_")?;
    in_port(d, tbuf, "A", Value::X);
    in_port(d, tbuf, "E", Value::X);
    out_port(d, tbuf, "Y");

    let mac16 = d.add_model("SB_MAC16")?;
    in_port(d, mac16, "CLK", Value::X);
    in_port(d, mac16, "CE", Value::One);
    for i in 0..16 {
        in_port(d, mac16, &format!("C[{i}]"), Value::Zero);
        in_port(d, mac16, &format!("A[{i}]"), Value::Zero);
        in_port(d, mac16, &format!("B[{i}]"), Value::Zero);
        in_port(d, mac16, &format!("D[{i}]"), Value::Zero);
    }
    for name in [
        "AHOLD", "BHOLD", "CHOLD", "DHOLD", "IRSTTOP", "IRSTBOT", "ORSTTOP", "ORSTBOT",
        "OLOADTOP", "OLOADBOT", "ADDSUBTOP", "ADDSUBBOT", "OHOLDTOP", "OHOLDBOT", "CI",
        "ACCUMCI", "SIGNEXTIN",
    ] {
        in_port(d, mac16, name, Value::Zero);
    }
    for i in 0..32 {
        out_port(d, mac16, &format!("O[{i}]"));
    }
    out_port(d, mac16, "CO");
    out_port(d, mac16, "ACCUMCO");
    out_port(d, mac16, "SIGNEXTOUT");
    for (name, width) in [
        ("C_REG", 1),
        ("A_REG", 1),
        ("B_REG", 1),
        ("D_REG", 1),
        ("TOP_8x8_MULT_REG", 1),
        ("BOT_8x8_MULT_REG", 1),
        ("PIPELINE_16x16_MULT_REG1", 1),
        ("PIPELINE_16x16_MULT_REG2", 1),
        ("TOPOUTPUT_SELECT", 2),
        ("TOPADDSUB_LOWERINPUT", 2),
        ("TOPADDSUB_UPPERINPUT", 1),
        ("TOPADDSUB_CARRYSELECT", 2),
        ("BOTOUTPUT_SELECT", 2),
        ("BOTADDSUB_LOWERINPUT", 2),
        ("BOTADDSUB_UPPERINPUT", 1),
        ("BOTADDSUB_CARRYSELECT", 2),
        ("MODE_8x8", 1),
        ("A_SIGNED", 1),
        ("B_SIGNED", 1),
    ] {
        d.set_model_param(mac16, name, Const::bits_of(width, 0));
    }

    let hfosc = d.add_model("SB_HFOSC")?;
    in_port(d, hfosc, "CLKHFPU", Value::Zero);
    in_port(d, hfosc, "CLKHFEN", Value::Zero);
    out_port(d, hfosc, "CLKHF");
    d.set_model_param(hfosc, "CLKHF_DIV", Const::str("0b00"));

    let hfosc_trim = d.add_model("SB_HFOSC_TRIM")?;
    in_port(d, hfosc_trim, "CLKHFPU", Value::Zero);
    in_port(d, hfosc_trim, "CLKHFEN", Value::Zero);
    for i in 0..10 {
        in_port(d, hfosc_trim, &format!("TRIM{i}"), Value::Zero);
    }
    out_port(d, hfosc_trim, "CLKHF");
    d.set_model_param(hfosc_trim, "CLKHF_DIV", Const::str("0b00"));

    let lfosc = d.add_model("SB_LFOSC")?;
    in_port(d, lfosc, "CLKLFPU", Value::Zero);
    in_port(d, lfosc, "CLKLFEN", Value::Zero);
    out_port(d, lfosc, "CLKLF");

    let spram = d.add_model("SB_SPRAM256KA")?;
    for i in 0..14 {
        in_port(d, spram, &format!("ADDRESS[{i}]"), Value::Zero);
    }
    for i in 0..16 {
        in_port(d, spram, &format!("DATAIN[{i}]"), Value::Zero);
    }
    for i in 0..4 {
        in_port(d, spram, &format!("MASKWREN[{i}]"), Value::Zero);
    }
    in_port(d, spram, "WREN", Value::Zero);
    in_port(d, spram, "CHIPSELECT", Value::Zero);
    in_port(d, spram, "CLOCK", Value::X);
    in_port(d, spram, "STANDBY", Value::Zero);
    in_port(d, spram, "SLEEP", Value::Zero);
    in_port(d, spram, "POWEROFF", Value::Zero);
    for i in 0..16 {
        out_port(d, spram, &format!("DATAOUT[{i}]"));
    }

    let rgba_drv = d.add_model("SB_RGBA_DRV")?;
    in_port(d, rgba_drv, "CURREN", Value::Zero);
    in_port(d, rgba_drv, "RGBLEDEN", Value::Zero);
    in_port(d, rgba_drv, "RGB0PWM", Value::Zero);
    in_port(d, rgba_drv, "RGB1PWM", Value::Zero);
    in_port(d, rgba_drv, "RGB2PWM", Value::Zero);
    out_port(d, rgba_drv, "RGB0");
    out_port(d, rgba_drv, "RGB1");
    out_port(d, rgba_drv, "RGB2");
    d.set_model_param(rgba_drv, "CURRENT_MODE", Const::str("0b0"));
    d.set_model_param(rgba_drv, "RGB0_CURRENT", Const::str("0b000000"));
    d.set_model_param(rgba_drv, "RGB1_CURRENT", Const::str("0b000000"));
    d.set_model_param(rgba_drv, "RGB2_CURRENT", Const::str("0b000000"));

    let i2c = d.add_model("SB_I2C")?;
    in_port(d, i2c, "SBCLKI", Value::X);
    in_port(d, i2c, "SBRWI", Value::Zero);
    in_port(d, i2c, "SBSTBI", Value::Zero);
    for i in 0..8 {
        in_port(d, i2c, &format!("SBADRI{i}"), Value::Zero);
    }
    for i in 0..8 {
        in_port(d, i2c, &format!("SBDATI{i}"), Value::Zero);
    }
    for i in 0..8 {
        out_port(d, i2c, &format!("SBDATO{i}"));
    }
    out_port(d, i2c, "SBACKO");
    out_port(d, i2c, "I2CIRQ");
    out_port(d, i2c, "I2CWKUP");
    in_port(d, i2c, "SCLI", Value::X);
    out_port(d, i2c, "SCLO");
    out_port(d, i2c, "SCLOE");
    in_port(d, i2c, "SDAI", Value::X);
    out_port(d, i2c, "SDAO");
    out_port(d, i2c, "SDAOE");
    d.set_model_param(i2c, "BUS_ADDR74", Const::str("0b0001"));

    let spi = d.add_model("SB_SPI")?;
    in_port(d, spi, "SBCLKI", Value::X);
    in_port(d, spi, "SBRWI", Value::Zero);
    in_port(d, spi, "SBSTBI", Value::Zero);
    for i in 0..8 {
        in_port(d, spi, &format!("SBADRI{i}"), Value::Zero);
    }
    for i in 0..8 {
        in_port(d, spi, &format!("SBDATI{i}"), Value::Zero);
    }
    for i in 0..8 {
        out_port(d, spi, &format!("SBDATO{i}"));
    }
    out_port(d, spi, "SBACKO");
    out_port(d, spi, "SPIIRQ");
    out_port(d, spi, "SPIWKUP");
    in_port(d, spi, "MI", Value::X);
    out_port(d, spi, "SO");
    out_port(d, spi, "SOE");
    in_port(d, spi, "SI", Value::X);
    out_port(d, spi, "MO");
    out_port(d, spi, "MOE");
    in_port(d, spi, "SCKI", Value::X);
    out_port(d, spi, "SCKO");
    out_port(d, spi, "SCKOE");
    in_port(d, spi, "SCSNI", Value::X);
    for i in 0..4 {
        out_port(d, spi, &format!("MCSNO{i}"));
    }
    for i in 0..4 {
        out_port(d, spi, &format!("MCSNOE{i}"));
    }
    d.set_model_param(spi, "BUS_ADDR74", Const::str("0b0000"));

    let ledda = d.add_model("SB_LEDDA_IP")?;
    in_port(d, ledda, "LEDDCS", Value::Zero);
    in_port(d, ledda, "LEDDCLK", Value::X);
    for i in (0..8).rev() {
        in_port(d, ledda, &format!("LEDDDAT{i}"), Value::Zero);
    }
    for i in (0..4).rev() {
        in_port(d, ledda, &format!("LEDDADDR{i}"), Value::Zero);
    }
    in_port(d, ledda, "LEDDDEN", Value::Zero);
    in_port(d, ledda, "LEDDEXE", Value::Zero);
    in_port(d, ledda, "LEDDRST", Value::Zero);
    out_port(d, ledda, "PWMOUT0");
    out_port(d, ledda, "PWMOUT1");
    out_port(d, ledda, "PWMOUT2");
    out_port(d, ledda, "LEDDON");

    Ok(())
}

/// Cached ids of the standard models, with kind predicates over instances.
#[derive(Debug, Clone)]
pub struct Models {
    /// `SB_LUT4`.
    pub lut4: ModelId,
    /// `SB_CARRY`.
    pub carry: ModelId,
    /// `ICESTORM_LC`.
    pub lc: ModelId,
    /// `SB_IO`.
    pub io: ModelId,
    /// `SB_GB`.
    pub gb: ModelId,
    /// `SB_GB_IO`.
    pub gb_io: ModelId,
    /// `SB_IO_I3C`.
    pub io_i3c: ModelId,
    /// `SB_IO_OD_A` (the normalized open-drain IO).
    pub io_od: ModelId,
    /// `SB_RAM40_4K`.
    pub ram: ModelId,
    /// `SB_RAM40_4KNR`.
    pub ramnr: ModelId,
    /// `SB_RAM40_4KNW`.
    pub ramnw: ModelId,
    /// `SB_RAM40_4KNRNW`.
    pub ramnrnw: ModelId,
    /// `SB_WARMBOOT`.
    pub warmboot: ModelId,
    /// `$_TBUF_`.
    pub tbuf: ModelId,
}

impl Models {
    /// Resolves the standard models in `d`.
    pub fn new(d: &Design) -> Self {
        let find = |n: &str| d.find_model(n).expect("standard models not created");
        Self {
            lut4: find("SB_LUT4"),
            carry: find("SB_CARRY"),
            lc: find("ICESTORM_LC"),
            io: find("SB_IO"),
            gb: find("SB_GB"),
            gb_io: find("SB_GB_IO"),
            io_i3c: find("SB_IO_I3C"),
            io_od: find("SB_IO_OD_A"),
            ram: find("SB_RAM40_4K"),
            ramnr: find("SB_RAM40_4KNR"),
            ramnw: find("SB_RAM40_4KNW"),
            ramnrnw: find("SB_RAM40_4KNRNW"),
            warmboot: find("SB_WARMBOOT"),
            tbuf: find("$_TBUF_"),
        }
    }

    fn inst_of(&self, d: &Design, i: InstanceId) -> ModelId {
        d.instance(i).instance_of
    }

    fn inst_model_name<'a>(&self, d: &'a Design, i: InstanceId) -> &'a str {
        &d.model(d.instance(i).instance_of).name
    }

    /// Any `SB_DFF*` flavor.
    pub fn is_dff(&self, d: &Design, i: InstanceId) -> bool {
        self.inst_model_name(d, i).starts_with("SB_DFF")
    }

    /// `SB_LUT4`.
    pub fn is_lut4(&self, d: &Design, i: InstanceId) -> bool {
        self.inst_of(d, i) == self.lut4
    }

    /// `SB_CARRY`.
    pub fn is_carry(&self, d: &Design, i: InstanceId) -> bool {
        self.inst_of(d, i) == self.carry
    }

    /// `ICESTORM_LC`.
    pub fn is_lc(&self, d: &Design, i: InstanceId) -> bool {
        self.inst_of(d, i) == self.lc
    }

    /// Plain `SB_IO`.
    pub fn is_io(&self, d: &Design, i: InstanceId) -> bool {
        self.inst_of(d, i) == self.io
    }

    /// `SB_GB`.
    pub fn is_gb(&self, d: &Design, i: InstanceId) -> bool {
        self.inst_of(d, i) == self.gb
    }

    /// `SB_GB_IO`.
    pub fn is_gb_io(&self, d: &Design, i: InstanceId) -> bool {
        self.inst_of(d, i) == self.gb_io
    }

    /// `SB_IO_I3C`.
    pub fn is_io_i3c(&self, d: &Design, i: InstanceId) -> bool {
        self.inst_of(d, i) == self.io_i3c
    }

    /// `SB_IO_OD_A`.
    pub fn is_io_od(&self, d: &Design, i: InstanceId) -> bool {
        self.inst_of(d, i) == self.io_od
    }

    /// Any IO-family cell (SB_IO, SB_GB_IO, SB_IO_I3C, SB_IO_OD_A).
    pub fn is_io_family(&self, d: &Design, i: InstanceId) -> bool {
        let m = self.inst_of(d, i);
        m == self.io || m == self.gb_io || m == self.io_i3c || m == self.io_od
    }

    /// A buffer that can drive a global: SB_GB or SB_GB_IO.
    pub fn is_gb_family(&self, d: &Design, i: InstanceId) -> bool {
        let m = self.inst_of(d, i);
        m == self.gb || m == self.gb_io
    }

    /// Any `SB_RAM40_4K*` flavor.
    pub fn is_ram(&self, d: &Design, i: InstanceId) -> bool {
        let m = self.inst_of(d, i);
        m == self.ram || m == self.ramnr || m == self.ramnw || m == self.ramnrnw
    }

    /// Negative-read-clock RAM flavors.
    pub fn is_ram_neg_rclk(&self, d: &Design, i: InstanceId) -> bool {
        let m = self.inst_of(d, i);
        m == self.ramnr || m == self.ramnrnw
    }

    /// Negative-write-clock RAM flavors.
    pub fn is_ram_neg_wclk(&self, d: &Design, i: InstanceId) -> bool {
        let m = self.inst_of(d, i);
        m == self.ramnw || m == self.ramnrnw
    }

    /// `SB_WARMBOOT`.
    pub fn is_warmboot(&self, d: &Design, i: InstanceId) -> bool {
        self.inst_of(d, i) == self.warmboot
    }

    /// `$_TBUF_`.
    pub fn is_tbuf(&self, d: &Design, i: InstanceId) -> bool {
        self.inst_of(d, i) == self.tbuf
    }

    /// Any `SB_PLL40_*` flavor.
    pub fn is_pll(&self, d: &Design, i: InstanceId) -> bool {
        self.inst_model_name(d, i).starts_with("SB_PLL40_")
    }

    /// A dual-output PLL flavor.
    pub fn is_dual_pll(&self, d: &Design, i: InstanceId) -> bool {
        matches!(
            self.inst_model_name(d, i),
            "SB_PLL40_2F_CORE" | "SB_PLL40_2_PAD" | "SB_PLL40_2F_PAD"
        )
    }

    /// `SB_MAC16`.
    pub fn is_mac16(&self, d: &Design, i: InstanceId) -> bool {
        self.inst_model_name(d, i) == "SB_MAC16"
    }

    /// `SB_SPRAM256KA`.
    pub fn is_spram(&self, d: &Design, i: InstanceId) -> bool {
        self.inst_model_name(d, i) == "SB_SPRAM256KA"
    }

    /// `SB_HFOSC` or `SB_HFOSC_TRIM`.
    pub fn is_hfosc(&self, d: &Design, i: InstanceId) -> bool {
        matches!(self.inst_model_name(d, i), "SB_HFOSC" | "SB_HFOSC_TRIM")
    }

    /// `SB_LFOSC`.
    pub fn is_lfosc(&self, d: &Design, i: InstanceId) -> bool {
        self.inst_model_name(d, i) == "SB_LFOSC"
    }

    /// `SB_RGBA_DRV`.
    pub fn is_rgba_drv(&self, d: &Design, i: InstanceId) -> bool {
        self.inst_model_name(d, i) == "SB_RGBA_DRV"
    }

    /// `SB_LEDDA_IP`.
    pub fn is_ledda_ip(&self, d: &Design, i: InstanceId) -> bool {
        self.inst_model_name(d, i) == "SB_LEDDA_IP"
    }

    /// `SB_I2C`.
    pub fn is_i2c(&self, d: &Design, i: InstanceId) -> bool {
        self.inst_model_name(d, i) == "SB_I2C"
    }

    /// `SB_SPI`.
    pub fn is_spi(&self, d: &Design, i: InstanceId) -> bool {
        self.inst_model_name(d, i) == "SB_SPI"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standard_design() -> (Design, ModelId, Models) {
        let mut d = Design::new();
        create_standard_models(&mut d).unwrap();
        let top = d.add_model("top").unwrap();
        d.set_top(top);
        let models = Models::new(&d);
        (d, top, models)
    }

    #[test]
    fn lc_ports_in_order() {
        let (d, _, models) = standard_design();
        let names: Vec<&str> = d
            .model(models.lc)
            .ports
            .iter()
            .map(|&p| d.port(p).name.as_str())
            .collect();
        assert_eq!(
            names,
            vec!["I0", "I1", "I2", "I3", "CIN", "CLK", "CEN", "SR", "LO", "O", "COUT"]
        );
    }

    #[test]
    fn lc_cen_default_is_one() {
        let (d, top, models) = standard_design();
        let mut d = d;
        let i = d.add_instance(top, models.lc);
        let cen = d.find_port(NodeRef::Instance(i), "CEN").unwrap();
        assert_eq!(d.port(cen).undriven, Value::One);
    }

    #[test]
    fn dff_matrix_complete() {
        let (d, _, _) = standard_design();
        for name in [
            "SB_DFF", "SB_DFFE", "SB_DFFSR", "SB_DFFR", "SB_DFFSS", "SB_DFFS", "SB_DFFESR",
            "SB_DFFER", "SB_DFFESS", "SB_DFFES", "SB_DFFN", "SB_DFFNE", "SB_DFFNSR", "SB_DFFNR",
            "SB_DFFNSS", "SB_DFFNS", "SB_DFFNESR", "SB_DFFNER", "SB_DFFNESS", "SB_DFFNES",
        ] {
            assert!(d.find_model(name).is_some(), "missing {name}");
        }
    }

    #[test]
    fn dff_predicate_spans_family() {
        let (mut d, top, models) = standard_design();
        let dffes = d.find_model("SB_DFFES").unwrap();
        let i = d.add_instance(top, dffes);
        assert!(models.is_dff(&d, i));
        assert!(!models.is_lut4(&d, i));
    }

    #[test]
    fn io_family_covers_variants() {
        let (mut d, top, models) = standard_design();
        for m in [models.io, models.gb_io, models.io_i3c, models.io_od] {
            let i = d.add_instance(top, m);
            assert!(models.is_io_family(&d, i));
        }
        let gb = d.add_instance(top, models.gb);
        assert!(!models.is_io_family(&d, gb));
        assert!(models.is_gb_family(&d, gb));
    }

    #[test]
    fn pll_predicates() {
        let (mut d, top, models) = standard_design();
        let single = d.find_model("SB_PLL40_CORE").unwrap();
        let dual = d.find_model("SB_PLL40_2F_PAD").unwrap();
        let i1 = d.add_instance(top, single);
        let i2 = d.add_instance(top, dual);
        assert!(models.is_pll(&d, i1) && !models.is_dual_pll(&d, i1));
        assert!(models.is_pll(&d, i2) && models.is_dual_pll(&d, i2));
    }

    #[test]
    fn ram_flavors_and_clock_polarity() {
        let (mut d, top, models) = standard_design();
        let rnr = d.add_instance(top, models.ramnr);
        assert!(models.is_ram(&d, rnr));
        assert!(models.is_ram_neg_rclk(&d, rnr));
        assert!(!models.is_ram_neg_wclk(&d, rnr));
        assert!(d.find_port(NodeRef::Instance(rnr), "RCLKN").is_some());
        assert!(d.find_port(NodeRef::Instance(rnr), "RCLK").is_none());
    }

    #[test]
    fn bram_init_defaults_are_256_bits() {
        let (d, _, models) = standard_design();
        let init0 = &d.model(models.ram).params["INIT_0"];
        assert_eq!(init0.as_bits().unwrap().len(), 256);
        assert!(d.model(models.ram).params.contains_key("INIT_F"));
    }

    #[test]
    fn io_pin_type_default_zero() {
        let (d, _, models) = standard_design();
        let pt = &d.model(models.io).params["PIN_TYPE"];
        assert_eq!(pt.as_bits().unwrap().len(), 6);
        assert_eq!(pt.as_bits().unwrap().low_u64(), 0);
    }
}
