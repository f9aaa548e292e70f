// Polyplex
// Copyright (c) 2024-2026 The Project Polyplex Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]
// Justification: Fields on the option structs may change at any time, but polyplex-dump doesn't
// want to be updated every time those fields change, therefore always fill in the remaining
// fields with default values.
#![allow(clippy::needless_update)]

use std::cell::Cell;
use std::fs::File;
use std::path::Path;

use polyplex::core::demux::Demuxer;
use polyplex::core::errors::Result;
use polyplex::core::formats::{StreamFormat, StreamInfo};
use polyplex::core::io::{MediaSource, ReadOnlySource};
use polyplex::core::packet::{Packet, PacketFlags};
use polyplex::core::seek::SeekOptions;
use polyplex::core::sync::Connector;
use polyplex::core::units::{Time, TimeBase};
use polyplex::AnyDriver;

use clap::{Arg, ArgMatches};
use log::{error, info};

/// Exit code when the input could not be opened.
const EXIT_OPEN_FAILED: i32 = 1;
/// Exit code when demultiplexing stopped on an error.
const EXIT_PLAYBACK_FAILED: i32 = 2;

fn main() {
    pretty_env_logger::init();

    let args = clap::Command::new("Polyplex Dump")
        .version("1.0")
        .author("The Project Polyplex Developers")
        .about("Print the streams and units of a media container with Polyplex")
        .arg(
            Arg::new("info")
                .long("info")
                .short('i')
                .help("Only print the format and stream information")
                .conflicts_with_all(&["seek", "max-units"]),
        )
        .arg(
            Arg::new("seek")
                .long("seek")
                .short('s')
                .value_name("SECS")
                .help("Seek to the time in seconds before printing units"),
        )
        .arg(
            Arg::new("max-skip")
                .long("max-skip")
                .value_name("SECS")
                .help("The furthest distance in seconds skipped forward after a seek"),
        )
        .arg(
            Arg::new("max-units")
                .long("max-units")
                .short('n')
                .value_name("N")
                .help("Stop after printing N units"),
        )
        .arg(
            Arg::new("mute")
                .long("mute")
                .short('m')
                .value_name("ID")
                .multiple_occurrences(true)
                .help("Do not deliver the units of the stream, may be repeated"),
        )
        .arg(
            Arg::new("INPUT")
                .help("The input file path, or - to use standard input")
                .required(true)
                .index(1),
        )
        .get_matches();

    let path = Path::new(args.value_of("INPUT").unwrap_or("-"));

    let mut demux = match open(path) {
        Ok(demux) => demux,
        Err(err) => {
            error!("{}", err.to_string().to_lowercase());
            std::process::exit(EXIT_OPEN_FAILED)
        }
    };

    print_format(path, &demux);

    if args.is_present("info") {
        return;
    }

    let code = match dump(&mut demux, &args) {
        Ok(()) => 0,
        Err(err) => {
            error!("{}", err.to_string().to_lowercase());
            EXIT_PLAYBACK_FAILED
        }
    };

    demux.close();

    std::process::exit(code)
}

fn open(path: &Path) -> Result<Demuxer<AnyDriver>> {
    // If the path string is '-' then read from standard input.
    let source = if path.as_os_str() == "-" {
        Box::new(ReadOnlySource::new(std::io::stdin())) as Box<dyn MediaSource>
    }
    else {
        Box::new(File::open(path)?)
    };

    polyplex::open(source, &Default::default(), &Default::default())
}

/// Deliver the units of every stream that is not muted in presentation order, and print them.
fn dump(demux: &mut Demuxer<AnyDriver>, args: &ArgMatches) -> Result<()> {
    let muted: Vec<u32> = match args.is_present("mute") {
        true => args.values_of_t_or_exit("mute"),
        false => Vec::new(),
    };

    let max_units = match args.is_present("max-units") {
        true => Some(args.value_of_t_or_exit::<u64>("max-units")),
        false => None,
    };

    let printed = Cell::new(0u64);

    let mut connector = Connector::new();

    for info in demux.streams().iter().filter(|info| !muted.contains(&info.id)) {
        let tb = info.time_base;
        let printed = &printed;

        connector.add_stream(info.id, move |pkt: &Packet| -> Result<()> {
            print_unit(pkt, tb);
            printed.set(printed.get() + 1);
            Ok(())
        });
    }

    connector.start(demux)?;

    if args.is_present("seek") {
        let secs = args.value_of_t_or_exit::<f64>("seek");

        let mut opts = SeekOptions::default();

        if args.is_present("max-skip") {
            opts.max_skip = Time::from_secs_f64(args.value_of_t_or_exit::<f64>("max-skip"));
        }

        let time = connector.seek(demux, Time::from_secs_f64(secs), &opts)?;
        info!("seeked to {}", time);
    }

    print_blank();
    print_header("Units");

    while connector.iteration(demux)? {
        if max_units.map_or(false, |max| printed.get() >= max) {
            break;
        }
    }

    info!("delivered {} units", printed.get());

    Ok(())
}

fn print_format(path: &Path, demux: &Demuxer<AnyDriver>) {
    println!("+ {}", path.display());

    let format = demux.format_info();

    print_header("Format");
    print_pair("Format:", &format!("{} ({})", format.long_name, format.short_name), 1);
    print_pair("Layout:", &demux.layout().as_str(), 1);

    if let Some(index) = demux.superindex() {
        print_pair("Index Entries:", &index.len(), 1);
    }

    print_streams(demux.streams());

    println!("-");
}

fn print_streams(streams: &[StreamInfo]) {
    if streams.is_empty() {
        return;
    }

    print_blank();
    print_header("Streams");

    for info in streams {
        println!("|     [{:0>2}] {}", info.id, info.stream_type().as_str());

        print_pair("Time Base:", &info.time_base, 2);

        if let Some(duration) = info.duration_time() {
            print_pair("Duration:", &duration, 2);
        }
        if let Some(name) = &info.name {
            print_pair("Name:", name, 2);
        }
        if let Some(language) = &info.language {
            print_pair("Language:", language, 2);
        }
        if !info.flags.is_empty() {
            print_pair("Flags:", &format!("{:?}", info.flags), 2);
        }

        match &info.format {
            StreamFormat::Audio(audio) => {
                print_pair("Sample Rate:", &audio.sample_rate, 2);
                print_pair("Channel(s):", &audio.channels, 2);
                if audio.bits_per_sample > 0 {
                    print_pair("Bits per Sample:", &audio.bits_per_sample, 2);
                }
            }
            StreamFormat::Video(video) => {
                print_pair("Size:", &format!("{}x{}", video.width, video.height), 2);
            }
            StreamFormat::Text(text) => {
                if let Some(encoding) = &text.encoding {
                    print_pair("Encoding:", encoding, 2);
                }
            }
        }

        for line in info.compression.to_string().lines() {
            println!("|          {}", line);
        }
    }
}

fn print_unit(pkt: &Packet, tb: TimeBase) {
    let time = match pkt.pts {
        Some(pts) => Time::from_ts(pts, tb).to_string(),
        None => "-".to_string(),
    };

    let pts = match pkt.pts {
        Some(pts) => pts.to_string(),
        None => "-".to_string(),
    };

    println!(
        "|     stream={:<2} pts={:<10} time={} size={:<8} flags={}",
        pkt.stream_id,
        pts,
        time,
        pkt.data_len(),
        fmt_flags(pkt.flags)
    );
}

fn fmt_flags(flags: PacketFlags) -> String {
    const NAMES: [(PacketFlags, char); 4] = [
        (PacketFlags::KEYFRAME, 'K'),
        (PacketFlags::NO_OUTPUT, 'N'),
        (PacketFlags::EXTENSION, 'X'),
        (PacketFlags::LAST, 'L'),
    ];

    NAMES.iter().map(|&(flag, ch)| if flags.contains(flag) { ch } else { '.' }).collect()
}

/// Print a key-value pair in a hierarchical list.
fn print_pair<T>(key: &str, value: &T, depth: usize)
where
    T: std::fmt::Display,
{
    let indent = 5 * depth;
    println!("|{:indent$}{:<20} {}", "", key, value)
}

/// Print a list header.
fn print_header(title: &str) {
    println!("| // {} //", title)
}

/// Print a blank list line.
fn print_blank() {
    println!("|")
}
