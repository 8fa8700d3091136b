use log::{error, info, warn};

use structopt::StructOpt;

use simplelog::{LevelFilter, TermLogger, TerminalMode};

use ihex::{Reader, Record};

use nb_eeprom::sim::SimEeprom;
use nb_eeprom::{Eeprom, Hal, ProgrammingMode};

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Simulated ATmega328P EEPROM.
type Sim = SimEeprom<1024>;

/// Bytes per ihex data record.
const RECORD_LEN: usize = 32;

#[derive(Debug, PartialEq, StructOpt)]
struct Options {
    #[structopt(subcommand)]
    operation: Operations,

    /// Intel HEX file holding the simulated EEPROM contents
    #[structopt(long, default_value = "eeprom.ihex", env = "EEPROM_IMAGE")]
    image: PathBuf,

    /// Configure log level
    #[structopt(long, default_value = "info", env = "LOG_LEVEL")]
    log_level: LevelFilter,
}

#[derive(Debug, PartialEq, StructOpt)]
pub enum Operations {
    /// Show the EEPROM geometry and image state
    Info,
    /// Read data from the EEPROM
    Read {
        /// EEPROM address for read start in hex
        #[structopt(parse(try_from_str = parse_hex))]
        address: u16,
        /// Length of read in bytes
        #[structopt()]
        length: u16,
    },
    /// Write data starting at the specified address
    Write {
        /// EEPROM address for write start in hex
        #[structopt(parse(try_from_str = parse_hex))]
        address: u16,

        // Data to write in hexadecimal
        #[structopt(long)]
        data: HexData,
    },
    /// Dump EEPROM contents into a hex file
    Dump {
        /// EEPROM address for read start in hex
        #[structopt(parse(try_from_str = parse_hex))]
        address: u16,

        /// Length of read in bytes
        #[structopt()]
        length: u16,

        /// Output ihex file
        #[structopt(long, default_value = "dump.ihex")]
        file: PathBuf,
    },
    /// Load EEPROM contents from a hex file
    Load {
        /// Input ihex file
        file: PathBuf,
    },
    /// Erase every writable cell
    EraseAll,
}

#[derive(Debug, PartialEq)]
pub struct HexData(Vec<u8>);

impl std::str::FromStr for HexData {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        hex::decode(s).map(HexData)
    }
}

fn parse_hex(s: &str) -> Result<u16, std::num::ParseIntError> {
    u16::from_str_radix(s.trim_start_matches("0x"), 16)
}

type Error = Box<dyn std::error::Error + 'static>;

static COMPLETED: AtomicUsize = AtomicUsize::new(0);

fn completed(counter: &'static AtomicUsize) {
    counter.fetch_add(1, Ordering::SeqCst);
}

/// Plays the part of the hardware: finishes each byte and delivers its
/// completion interrupt until the transfer is done.
fn drive(eeprom: &mut Eeprom<'_, Sim, &'static AtomicUsize>) -> usize {
    let mut interrupts = 0;
    while eeprom.hal_mut().complete() {
        eeprom.on_interrupt();
        interrupts += 1;
    }
    interrupts
}

/// Writes `data` through the driver and waits for the completion callback.
fn write(
    eeprom: &mut Eeprom<'_, Sim, &'static AtomicUsize>,
    address: u16,
    data: &[u8],
) -> Result<(), Error> {
    let before = COMPLETED.load(Ordering::SeqCst);
    // The driver borrows `data` for its own lifetime, so use a short-lived
    // driver over the same simulated peripheral.
    let mut session: Eeprom<'_, Sim, &'static AtomicUsize> =
        Eeprom::new(std::mem::take(eeprom.hal_mut()));
    session.set_callback(Some(completed), &COMPLETED)?;
    session.write(address, data)?;
    let interrupts = drive(&mut session);
    *eeprom.hal_mut() = session.free();

    if COMPLETED.load(Ordering::SeqCst) != before + 1 {
        return Err("write did not signal completion".into());
    }
    info!("{} bytes committed after {} interrupts", data.len(), interrupts);
    Ok(())
}

fn load_image(sim: &mut Sim, path: &Path) -> Result<(), Error> {
    let text = std::fs::read_to_string(path)?;
    for record in Reader::new(&text) {
        match record.map_err(|e| format!("{:?}", e))? {
            Record::Data { offset, value } => sim
                .load(usize::from(offset), &value)
                .map_err(|e| format!("record at 0x{:04x}: {}", offset, e))?,
            Record::EndOfFile => (),
            other => warn!("Ignoring record: {:?}", other),
        }
    }
    Ok(())
}

fn to_ihex(address: u16, data: &[u8]) -> Result<String, Error> {
    let mut records = Vec::new();
    for (c, chunk) in data.chunks(RECORD_LEN).enumerate() {
        records.push(Record::Data {
            offset: address + (c * RECORD_LEN) as u16,
            value: chunk.to_vec(),
        });
    }
    records.push(Record::EndOfFile);
    Ok(ihex::create_object_file_representation(&records).map_err(|e| format!("{:?}", e))?)
}

fn main() -> Result<(), Error> {
    // Load options
    let opts = Options::from_args();

    // Setup logging
    TermLogger::init(opts.log_level, simplelog::Config::default(), TerminalMode::Mixed).unwrap();

    // Restore the simulated EEPROM
    let mut sim = Sim::new();
    if opts.image.exists() {
        info!("Loading image {}", opts.image.display());
        load_image(&mut sim, &opts.image)?;
    }

    let mut eeprom = Eeprom::new(sim);
    eeprom.begin();

    let mut dirty = false;

    // Perform the requested operation
    match &opts.operation {
        Operations::Info => {
            let blank = eeprom.hal().image().iter().filter(|b| **b == 0xFF).count();
            info!(
                "EEPROM: {} bytes, writable range 0x000..0x{:03x}, {} bytes erased",
                Sim::MAX_ADDR as usize + 1,
                Sim::MAX_ADDR,
                blank
            );
        }
        Operations::Read { address, length } => {
            info!("Reading {} bytes from address 0x{:03x}", length, address);

            let mut buff = vec![0u8; *length as usize];
            eeprom.read(*address, &mut buff)?;

            info!("Read: {:02x?}", buff);
        }
        Operations::Write { address, data } => {
            info!("Writing {} bytes to address 0x{:03x}", data.0.len(), address);

            write(&mut eeprom, *address, &data.0)?;
            dirty = true;

            info!("Write complete");
        }
        Operations::Dump { address, length, file } => {
            info!(
                "Reading {} bytes from address 0x{:03x} to file {}",
                length,
                address,
                file.display()
            );

            let mut buff = vec![0u8; *length as usize];
            eeprom.read(*address, &mut buff)?;
            std::fs::write(file, to_ihex(*address, &buff)?)?;

            info!("Dump complete");
        }
        Operations::Load { file } => {
            info!("Loading file {}", file.display());

            let text = std::fs::read_to_string(file)?;
            for record in Reader::new(&text) {
                match record {
                    Ok(Record::Data { offset, value }) => {
                        info!("Writing {} bytes at address 0x{:03x}", value.len(), offset);
                        write(&mut eeprom, offset, &value)?;
                    }
                    Ok(Record::EndOfFile) => (),
                    Err(e) => {
                        error!("Reader error: {:?}", e);
                        return Ok(());
                    }
                    _ => {
                        error!("Unrecognised record: {:?}", record);
                        return Ok(());
                    }
                }
            }
            dirty = true;

            info!("Load complete");
        }
        Operations::EraseAll => {
            info!("Erasing all cells");

            eeprom.begin_with_mode(ProgrammingMode::EraseOnly);
            let blank = vec![0xFF; usize::from(Sim::MAX_ADDR)];
            write(&mut eeprom, 0, &blank)?;
            eeprom.begin();
            dirty = true;

            info!("Full erase complete");
        }
    }

    if dirty {
        info!("Saving image {}", opts.image.display());
        std::fs::write(&opts.image, to_ihex(0, eeprom.hal().image())?)?;
    }

    Ok(())
}
