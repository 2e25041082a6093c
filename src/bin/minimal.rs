// Minimal smoke run of the ffmpeg-free parts: generation and smoothing

use depth_video::{
    depth::{SmoothingMode, TemporalSmoother},
    generator::{GenerationConfig, GeneratorRegistry},
    video::Frame,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("🎬 Testing Depth-Video Core Functionality");

    // Test 1: Generator Registry
    println!("\n1. Testing Generator Registry...");
    let registry = GeneratorRegistry::new();
    println!("   Available generators: {:?}", registry.available_generators());
    let generator = registry.create("luminance")?;
    println!("   Generator: {} - {}", generator.name(), generator.description());

    // Test 2: Frames
    println!("\n2. Creating a fading sequence...");
    let frames: Vec<Frame> = (0..12u8)
        .map(|i| Frame::new_filled(64, 48, [i * 20, i * 15, 200 - i * 10]))
        .collect();
    println!("   Created {} frames of {}x{}", frames.len(), frames[0].width(), frames[0].height());

    // Test 3: Depth Prediction
    println!("\n3. Running depth prediction pass...");
    let config = GenerationConfig::with_outputs(["depth", "heatmap"]);
    let raw = generator.generate(&frames, None, &config.first_pass())?;
    let fields: Vec<_> = raw.iter().map(|g| g.frame.to_field()).collect();
    println!("   Got {} raw depth fields", fields.len());

    // Test 4: Temporal Smoothing
    println!("\n4. Smoothing...");
    for mode in [SmoothingMode::None, SmoothingMode::Experimental] {
        let smoothed = TemporalSmoother::new(mode.clone()).smooth(&fields)?;
        let lo = smoothed.iter().map(|f| f.min()).fold(f32::INFINITY, f32::min);
        let hi = smoothed.iter().map(|f| f.max()).fold(f32::NEG_INFINITY, f32::max);
        println!("   {:<12} range [{:.3}, {:.3}]", mode.to_string(), lo, hi);
    }

    // Test 5: Output Generation
    println!("\n5. Generating outputs...");
    let depths: Vec<Frame> = TemporalSmoother::new(SmoothingMode::Experimental)
        .smooth(&fields)?
        .into_iter()
        .map(Frame::Field)
        .collect();
    let outputs = generator.generate(&frames, Some(depths.as_slice()), &config)?;
    println!("   Generated {} frames", outputs.len());

    if let Some(heatmap) = outputs.iter().find(|g| g.kind.as_str() == "heatmap") {
        match heatmap.frame.save_png("minimal_heatmap.png") {
            Ok(()) => println!("   📁 Heatmap saved to: minimal_heatmap.png"),
            Err(e) => println!("   ⚠️  Could not save file: {}", e),
        }
    }

    println!("\n🎉 Core is working.");
    Ok(())
}
