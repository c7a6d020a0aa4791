//! Motion-capture streaming protocol decoding.
//!
//! Packets are a 4-byte header (`u16` message id, `u16` payload length)
//! followed by a payload whose layout depends on the negotiated protocol
//! version. The format is not self-describing: `version` gates every
//! optional field, and a major version of 0 acts as a wildcard that enables
//! every gated field.
//!
//! Every read goes through the bounds-checked cursor in `reader`. A fault
//! aborts the current packet only; the header's declared length always says
//! where the next packet starts. Model definitions go through
//! `descriptions`, frames through `frame`, and `parser` dispatches by message
//! id. `writer` produces the packets a client sends plus payload encoders
//! mirroring the decoders.
//!
//! Version française (résumé):
//! Décodage du protocole de streaming mocap. La version négociée conditionne
//! chaque champ ; la version majeure 0 active tous les champs. Toute lecture
//! passe par le curseur borné de `reader` ; une erreur n'interrompt que le
//! paquet courant.

pub mod descriptions;
pub mod error;
pub mod frame;
pub mod layout;
pub mod model;
pub mod parser;
pub mod reader;
pub mod version;
pub mod writer;

pub use descriptions::decode_descriptions;
pub use error::{DecodeError, RecordKind};
pub use frame::decode_frame;
pub use parser::{DecodedPacket, Message, PacketDecoder, PacketHeader, decode_packet};
pub use reader::ByteCursor;
pub use version::{BitstreamState, ProtocolVersion, StreamContext, VersionParseError};
pub use writer::{
    ControlKind, EncodeError, PayloadWriter, build_bitstream_request, build_control_packet,
    build_packet, build_request_packet, encode_descriptions, encode_frame, encode_response,
    encode_server_info,
};
