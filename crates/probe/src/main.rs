use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use glam::Vec3;

use replica::{
    DecodeContext, EncodingTag, MotionBounds, ObjectId, Region, RegionHandle, ReplicationConfig,
    Replicator, UpdatePayload, UpdateRecord,
};

#[derive(Parser)]
#[command(name = "replica-probe")]
#[command(about = "Decode and replay object update payloads")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse one payload and print what it carries
    Decode {
        #[command(flatten)]
        payload: PayloadArgs,

        #[command(flatten)]
        region: RegionArgs,
    },
    /// Apply one payload, then dead-reckon it for a number of frames
    Simulate {
        #[command(flatten)]
        payload: PayloadArgs,

        #[command(flatten)]
        region: RegionArgs,

        #[arg(short, long, default_value_t = 30)]
        frames: u32,

        #[arg(long, default_value_t = 30.0)]
        fps: f64,

        #[arg(short, long, help = "RON replication config")]
        config: Option<PathBuf>,

        #[arg(long, default_value_t = 1.0, help = "Region time dilation (0-1]")]
        dilation: f32,
    },
    /// Print the default replication config as RON
    Config,
}

#[derive(clap::Args)]
struct PayloadArgs {
    #[arg(short, long, value_enum)]
    tag: TagArg,

    #[arg(long, help = "Payload bytes as hex")]
    hex: String,

    #[arg(long, default_value_t = 1)]
    local_id: u32,

    #[arg(long, help = "Global object id as 32 hex digits")]
    id: Option<String>,
}

#[derive(clap::Args)]
struct RegionArgs {
    #[arg(long, default_value_t = 256.0)]
    width: f32,

    #[arg(long, default_value_t = -256.0, allow_hyphen_values = true)]
    min_height: f32,

    #[arg(long, default_value_t = 4096.0)]
    max_height: f32,
}

#[derive(Clone, Copy, ValueEnum)]
enum TagArg {
    Full,
    Terse,
    CompressedTerse,
    CompressedFull,
    Cached,
}

impl From<TagArg> for EncodingTag {
    fn from(tag: TagArg) -> Self {
        match tag {
            TagArg::Full => EncodingTag::Full,
            TagArg::Terse => EncodingTag::Terse,
            TagArg::CompressedTerse => EncodingTag::CompressedTerse,
            TagArg::CompressedFull => EncodingTag::CompressedFull,
            TagArg::Cached => EncodingTag::Cached,
        }
    }
}

impl RegionArgs {
    fn region(&self) -> Region {
        Region::new(RegionHandle::from_origin(0, 0))
            .with_width(self.width)
            .with_heights(self.min_height, self.max_height)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match args.command {
        Command::Decode { payload, region } => decode(&payload, &region.region()),
        Command::Simulate {
            payload,
            region,
            frames,
            fps,
            config,
            dilation,
        } => {
            let config = match config {
                Some(path) => load_config(&path)?,
                None => ReplicationConfig::default(),
            };
            let mut region = region.region();
            region.set_time_dilation(dilation);
            simulate(&payload, region, config, frames, fps)
        }
        Command::Config => {
            let text = ron::ser::to_string_pretty(
                &ReplicationConfig::default(),
                ron::ser::PrettyConfig::default(),
            )?;
            println!("{text}");
            Ok(())
        }
    }
}

fn load_config(path: &Path) -> Result<ReplicationConfig> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let config: ReplicationConfig =
        ron::de::from_reader(file).with_context(|| format!("parsing {}", path.display()))?;
    log::info!("loaded config from {}", path.display());
    Ok(config.validated())
}

fn payload_bytes(args: &PayloadArgs) -> Result<Vec<u8>> {
    let cleaned: String = args.hex.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(&cleaned).context("payload is not valid hex")
}

fn object_id(args: &PayloadArgs) -> Result<ObjectId> {
    let Some(text) = &args.id else {
        let mut bytes = [0u8; 16];
        bytes[12..].copy_from_slice(&args.local_id.to_be_bytes());
        return Ok(ObjectId::from_bytes(bytes));
    };
    let digits: String = text.chars().filter(|c| *c != '-').collect();
    let raw = hex::decode(&digits).context("object id is not valid hex")?;
    let Ok(bytes) = <[u8; 16]>::try_from(raw.as_slice()) else {
        bail!("object id must be 16 bytes, got {}", raw.len());
    };
    Ok(ObjectId::from_bytes(bytes))
}

fn decode(args: &PayloadArgs, region: &Region) -> Result<()> {
    let bytes = payload_bytes(args)?;
    let bounds: MotionBounds = region.motion_bounds();
    let payload = UpdatePayload::parse(args.tag.into(), &bytes, &bounds)
        .with_context(|| format!("decoding {} byte payload", bytes.len()))?;

    println!("{:?} record, {:?} precision", payload.tag(), payload.tier());
    println!("{:#?}", payload.into_decoded());
    Ok(())
}

fn simulate(
    args: &PayloadArgs,
    region: Region,
    config: ReplicationConfig,
    frames: u32,
    fps: f64,
) -> Result<()> {
    if !(fps.is_finite() && fps > 0.0) {
        bail!("fps must be positive");
    }
    let bytes = payload_bytes(args)?;
    let handle = region.handle;
    let frame_dt = 1.0 / fps;

    let mut replicator = Replicator::new(config);
    replicator.add_region(region);

    let record = UpdateRecord::new(args.tag.into(), handle, args.local_id, 1, &bytes)
        .with_full_id(object_id(args)?);
    let ctx = DecodeContext {
        frame_dt: frame_dt as f32,
        ..DecodeContext::at(0.0)
    };
    let outcome = replicator.apply(&record, &ctx)?;
    log::info!("applied {:?}: {outcome:?}", record.tag);

    for frame in 0..=frames {
        let now = frame as f64 * frame_dt;
        replicator.tick(now);
        let Some(entity) = replicator.entity(handle, args.local_id) else {
            log::warn!("entity {} is gone", args.local_id);
            break;
        };
        let (position, rotation) = replicator
            .world_transform(handle, args.local_id)
            .unwrap_or((entity.state.position, entity.state.rotation));
        println!(
            "{now:7.3}s  pos {}  vel {}  rot {}{}",
            fmt_vec(position),
            fmt_vec(entity.state.velocity),
            fmt_vec(rotation.to_scaled_axis()),
            if entity.needs_correction { "  (frozen)" } else { "" }
        );
    }

    for request in replicator.drain_refetch() {
        log::warn!(
            "refetch requested for {} in {}: {:?}",
            request.local_id,
            request.region,
            request.reason
        );
    }
    log::info!("{:?}", replicator.stats());
    Ok(())
}

fn fmt_vec(v: Vec3) -> String {
    format!("({:8.3}, {:8.3}, {:8.3})", v.x, v.y, v.z)
}
