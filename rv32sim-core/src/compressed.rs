//! Expansion of 16-bit compressed instructions into their 32-bit equivalents.
//!
//! The expander is a pure function: it neither reads nor mutates machine
//! state. The fetch unit decides whether a halfword is compressed (low two
//! bits != `0b11`) and calls [`expand`] to obtain the 32-bit encoding that
//! the regular decoder understands.

use thiserror::Error;

/// The 16-bit pattern is not a valid RV32C instruction.
///
/// This includes the all-zero halfword, reserved encodings, and the
/// floating-point register forms (this core has no F extension).
#[derive(Error, Debug, Clone, Eq, PartialEq)]
#[error("illegal compressed instruction {0:#06x}")]
pub struct IllegalCompressed(pub u16);

/// Returns `true` if `halfword` is the start of a compressed instruction.
pub fn is_compressed(halfword: u16) -> bool {
    halfword & 0b11 != 0b11
}

/// Translates a compressed instruction to its 32-bit equivalent encoding.
pub fn expand(halfword: u16) -> Result<u32, IllegalCompressed> {
    let h = halfword;
    let illegal = || IllegalCompressed(halfword);

    // Registers of the three-bit rd'/rs1'/rs2' fields map to x8..x15.
    let rd_p = bits(h, 4, 2) + 8;
    let rs1_p = bits(h, 9, 7) + 8;
    let rs2_p = rd_p;
    let rd_full = bits(h, 11, 7);

    match (bits(h, 15, 13), h & 0b11) {
        // C.ADDI4SPN: addi rd', x2, nzuimm
        (0b000, 0b00) => {
            let imm =
                (bits(h, 12, 11) << 4) | (bits(h, 10, 7) << 6) | (bit(h, 6) << 2) | (bit(h, 5) << 3);
            // Covers the defined-illegal all-zero halfword as well.
            if imm == 0 {
                return Err(illegal());
            }
            Ok(enc_i(imm as i32, 2, 0b000, rd_p, OPC_OP_IMM))
        }
        // C.LW: lw rd', uimm(rs1')
        (0b010, 0b00) => {
            let imm = (bits(h, 12, 10) << 3) | (bit(h, 6) << 2) | (bit(h, 5) << 6);
            Ok(enc_i(imm as i32, rs1_p, 0b010, rd_p, OPC_LOAD))
        }
        // C.SW: sw rs2', uimm(rs1')
        (0b110, 0b00) => {
            let imm = (bits(h, 12, 10) << 3) | (bit(h, 6) << 2) | (bit(h, 5) << 6);
            Ok(enc_s(imm as i32, rs2_p, rs1_p, 0b010, OPC_STORE))
        }
        // C.ADDI (and C.NOP): addi rd, rd, nzimm
        (0b000, 0b01) => Ok(enc_i(ci_imm(h), rd_full, 0b000, rd_full, OPC_OP_IMM)),
        // C.JAL: jal x1, offset
        (0b001, 0b01) => Ok(enc_j(cj_offset(h), 1)),
        // C.LI: addi rd, x0, imm
        (0b010, 0b01) => Ok(enc_i(ci_imm(h), 0, 0b000, rd_full, OPC_OP_IMM)),
        (0b011, 0b01) => {
            if rd_full == 2 {
                // C.ADDI16SP: addi x2, x2, nzimm
                let imm = sign_extend(
                    (bit(h, 12) << 9)
                        | (bit(h, 6) << 4)
                        | (bit(h, 5) << 6)
                        | (bits(h, 4, 3) << 7)
                        | (bit(h, 2) << 5),
                    10,
                );
                if imm == 0 {
                    return Err(illegal());
                }
                Ok(enc_i(imm, 2, 0b000, 2, OPC_OP_IMM))
            } else {
                // C.LUI: lui rd, nzimm
                let imm = ci_imm(h);
                if imm == 0 {
                    return Err(illegal());
                }
                Ok(enc_u(imm as u32, rd_full, OPC_LUI))
            }
        }
        (0b100, 0b01) => match bits(h, 11, 10) {
            // C.SRLI / C.SRAI: shamt bit 5 must be zero on RV32
            0b00 | 0b01 => {
                if bit(h, 12) != 0 {
                    return Err(illegal());
                }
                let shamt = bits(h, 6, 2) as i32;
                let imm = match bits(h, 11, 10) {
                    0b00 => shamt,
                    _ => shamt | (0b0100000 << 5),
                };
                Ok(enc_i(imm, rs1_p, 0b101, rs1_p, OPC_OP_IMM))
            }
            // C.ANDI
            0b10 => Ok(enc_i(ci_imm(h), rs1_p, 0b111, rs1_p, OPC_OP_IMM)),
            // C.SUB / C.XOR / C.OR / C.AND
            _ => {
                if bit(h, 12) != 0 {
                    return Err(illegal());
                }
                let rs2 = bits(h, 4, 2) + 8;
                let (funct7, funct3) = match bits(h, 6, 5) {
                    0b00 => (0b0100000, 0b000),
                    0b01 => (0b0000000, 0b100),
                    0b10 => (0b0000000, 0b110),
                    _ => (0b0000000, 0b111),
                };
                Ok(enc_r(funct7, rs2, rs1_p, funct3, rs1_p, OPC_OP))
            }
        },
        // C.J: jal x0, offset
        (0b101, 0b01) => Ok(enc_j(cj_offset(h), 0)),
        // C.BEQZ / C.BNEZ: beq/bne rs1', x0, offset
        (0b110, 0b01) => Ok(enc_b(cb_offset(h), 0, rs1_p, 0b000)),
        (0b111, 0b01) => Ok(enc_b(cb_offset(h), 0, rs1_p, 0b001)),
        // C.SLLI: shamt bit 5 must be zero on RV32
        (0b000, 0b10) => {
            if bit(h, 12) != 0 {
                return Err(illegal());
            }
            Ok(enc_i(
                bits(h, 6, 2) as i32,
                rd_full,
                0b001,
                rd_full,
                OPC_OP_IMM,
            ))
        }
        // C.LWSP: lw rd, uimm(x2)
        (0b010, 0b10) => {
            if rd_full == 0 {
                return Err(illegal());
            }
            let imm = (bit(h, 12) << 5) | (bits(h, 6, 4) << 2) | (bits(h, 3, 2) << 6);
            Ok(enc_i(imm as i32, 2, 0b010, rd_full, OPC_LOAD))
        }
        (0b100, 0b10) => {
            let rs2 = bits(h, 6, 2);
            match (bit(h, 12), rs2) {
                // C.JR: jalr x0, 0(rs1)
                (0, 0) => {
                    if rd_full == 0 {
                        return Err(illegal());
                    }
                    Ok(enc_i(0, rd_full, 0b000, 0, OPC_JALR))
                }
                // C.MV: add rd, x0, rs2
                (0, _) => Ok(enc_r(0, rs2, 0, 0b000, rd_full, OPC_OP)),
                // C.EBREAK
                (_, 0) if rd_full == 0 => Ok(0x0010_0073),
                // C.JALR: jalr x1, 0(rs1)
                (_, 0) => Ok(enc_i(0, rd_full, 0b000, 1, OPC_JALR)),
                // C.ADD: add rd, rd, rs2
                (_, _) => Ok(enc_r(0, rs2, rd_full, 0b000, rd_full, OPC_OP)),
            }
        }
        // C.SWSP: sw rs2, uimm(x2)
        (0b110, 0b10) => {
            let imm = (bits(h, 12, 9) << 2) | (bits(h, 8, 7) << 6);
            Ok(enc_s(imm as i32, bits(h, 6, 2), 2, 0b010, OPC_STORE))
        }
        // Remaining patterns are floating-point forms or reserved.
        _ => Err(illegal()),
    }
}

const OPC_LOAD: u32 = 0b0000011;
const OPC_OP_IMM: u32 = 0b0010011;
const OPC_STORE: u32 = 0b0100011;
const OPC_OP: u32 = 0b0110011;
const OPC_LUI: u32 = 0b0110111;
const OPC_JALR: u32 = 0b1100111;
const OPC_JAL: u32 = 0b1101111;
const OPC_BRANCH: u32 = 0b1100011;

fn bit(h: u16, i: u32) -> u32 {
    (u32::from(h) >> i) & 1
}

fn bits(h: u16, hi: u32, lo: u32) -> u32 {
    (u32::from(h) >> lo) & ((1 << (hi - lo + 1)) - 1)
}

fn sign_extend(value: u32, width: u32) -> i32 {
    (value << (32 - width)) as i32 >> (32 - width)
}

/// The 6-bit CI-format immediate, sign-extended.
fn ci_imm(h: u16) -> i32 {
    sign_extend((bit(h, 12) << 5) | bits(h, 6, 2), 6)
}

/// The 12-bit CJ-format jump offset, sign-extended.
fn cj_offset(h: u16) -> i32 {
    sign_extend(
        (bit(h, 12) << 11)
            | (bit(h, 11) << 4)
            | (bits(h, 10, 9) << 8)
            | (bit(h, 8) << 10)
            | (bit(h, 7) << 6)
            | (bit(h, 6) << 7)
            | (bits(h, 5, 3) << 1)
            | (bit(h, 2) << 5),
        12,
    )
}

/// The 9-bit CB-format branch offset, sign-extended.
fn cb_offset(h: u16) -> i32 {
    sign_extend(
        (bit(h, 12) << 8)
            | (bits(h, 11, 10) << 3)
            | (bits(h, 6, 5) << 6)
            | (bits(h, 4, 3) << 1)
            | (bit(h, 2) << 5),
        9,
    )
}

fn enc_r(funct7: u32, rs2: u32, rs1: u32, funct3: u32, rd: u32, opcode: u32) -> u32 {
    (funct7 << 25) | (rs2 << 20) | (rs1 << 15) | (funct3 << 12) | (rd << 7) | opcode
}

fn enc_i(imm: i32, rs1: u32, funct3: u32, rd: u32, opcode: u32) -> u32 {
    ((imm as u32 & 0xFFF) << 20) | (rs1 << 15) | (funct3 << 12) | (rd << 7) | opcode
}

fn enc_s(imm: i32, rs2: u32, rs1: u32, funct3: u32, opcode: u32) -> u32 {
    let imm = imm as u32;
    ((imm & 0xFE0) << 20) | (rs2 << 20) | (rs1 << 15) | (funct3 << 12) | ((imm & 0x1F) << 7) | opcode
}

fn enc_b(offset: i32, rs2: u32, rs1: u32, funct3: u32) -> u32 {
    let imm = offset as u32;
    ((imm & 0x1000) << 19)
        | ((imm & 0x7E0) << 20)
        | (rs2 << 20)
        | (rs1 << 15)
        | (funct3 << 12)
        | ((imm & 0x1E) << 7)
        | ((imm & 0x800) >> 4)
        | OPC_BRANCH
}

fn enc_j(offset: i32, rd: u32) -> u32 {
    let imm = offset as u32;
    ((imm & 0x10_0000) << 11)
        | ((imm & 0x7FE) << 20)
        | ((imm & 0x800) << 9)
        | (imm & 0xF_F000)
        | (rd << 7)
        | OPC_JAL
}

fn enc_u(imm: u32, rd: u32, opcode: u32) -> u32 {
    ((imm & 0xF_FFFF) << 12) | (rd << 7) | opcode
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_compressed() {
        assert!(is_compressed(0x0001));
        assert!(is_compressed(0x4082));
        assert!(!is_compressed(0x0073));
        assert!(!is_compressed(0xFFFF));
    }

    #[test]
    fn test_all_zero_is_illegal() {
        assert_eq!(expand(0x0000), Err(IllegalCompressed(0x0000)));
    }

    #[test]
    fn test_nop() {
        // c.nop => addi x0, x0, 0
        assert_eq!(expand(0x0001), Ok(0x0000_0013));
    }

    #[test]
    fn test_addi() {
        // c.addi a0, 1 => addi a0, a0, 1
        assert_eq!(expand(0x0505), Ok(0x0015_0513));
        // c.li a0, -1 => addi a0, x0, -1
        assert_eq!(expand(0x557D), Ok(0xFFF0_0513));
    }

    #[test]
    fn test_lwsp() {
        // c.lwsp ra, 0(sp) => lw ra, 0(sp)
        assert_eq!(expand(0x4082), Ok(0x0001_2083));
    }

    #[test]
    fn test_sub() {
        // c.sub s0, s1 => sub s0, s0, s1
        assert_eq!(expand(0x8C05), Ok(0x4094_0433));
    }

    #[test]
    fn test_jumps() {
        // c.j . => jal x0, 0
        assert_eq!(expand(0xA001), Ok(0x0000_006F));
        // c.jr ra => jalr x0, 0(ra)
        assert_eq!(expand(0x8082), Ok(0x0000_8067));
    }

    #[test]
    fn test_beqz_backward() {
        // c.beqz s0, -4 => beq s0, x0, -4
        assert_eq!(expand(0xDC75), Ok(0xFE04_0EE3));
    }

    #[test]
    fn test_reserved_patterns() {
        // c.lwsp with rd=0 is reserved
        assert_eq!(expand(0x4002), Err(IllegalCompressed(0x4002)));
        // c.flw (RV32 quadrant 0, funct3=011) needs the F extension
        assert!(expand(0x6000).is_err());
        // c.srli with shamt bit 5 set is reserved on RV32
        assert!(expand(0x9401).is_err());
    }
}
