//! Centralized Contract Definitions
//!
//! All Solidity interfaces consumed by the routing engine, defined with
//! alloy's `sol!` macro. Calls are encoded here and dispatched through
//! the chain client's `eth_call`/multicall path, so the interfaces carry
//! no RPC attribute — only types, selectors and codecs.
//!
//! Selectors and struct layouts must match the on-chain signatures
//! exactly: a single byte-offset error breaks dynamic balance injection
//! silently.

use alloy::sol;

// ── ERC20 ─────────────────────────────────────────────────────────────

sol! {
    interface IERC20 {
        function approve(address spender, uint256 amount) external returns (bool);
        function allowance(address owner, address spender) external view returns (uint256);
        function balanceOf(address account) external view returns (uint256);
        function decimals() external view returns (uint8);
        function symbol() external view returns (string);
        function name() external view returns (string);
        function totalSupply() external view returns (uint256);
    }
}

// ── Wrapped native ────────────────────────────────────────────────────

sol! {
    interface IWrappedNative {
        function deposit() external payable;
        function withdraw(uint256 amount) external;
    }
}

// ── Uniswap V2 ───────────────────────────────────────────────────────

sol! {
    interface IUniswapV2Factory {
        function getPair(address tokenA, address tokenB) external view returns (address pair);
    }
}

sol! {
    interface IUniswapV2Pair {
        function getReserves() external view returns (uint112 reserve0, uint112 reserve1, uint32 blockTimestampLast);
        function token0() external view returns (address);
        function token1() external view returns (address);
    }
}

sol! {
    interface IUniswapV2Router02 {
        function swapExactTokensForTokens(uint256 amountIn, uint256 amountOutMin, address[] calldata path, address to, uint256 deadline) external returns (uint256[] memory amounts);
        function getAmountsOut(uint256 amountIn, address[] calldata path) external view returns (uint256[] memory amounts);
    }
}

// ── Uniswap V3 ───────────────────────────────────────────────────────

sol! {
    interface IUniswapV3Factory {
        function getPool(address tokenA, address tokenB, uint24 fee) external view returns (address pool);
    }
}

sol! {
    interface IUniswapV3Pool {
        function slot0() external view returns (uint160 sqrtPriceX96, int24 tick, uint16 observationIndex, uint16 observationCardinality, uint16 observationCardinalityNext, uint8 feeProtocol, bool unlocked);
        function liquidity() external view returns (uint128);
        function fee() external view returns (uint24);
        function token0() external view returns (address);
        function token1() external view returns (address);
    }
}

sol! {
    /// The original SwapRouter layout: params struct embeds a deadline.
    interface ISwapRouter {
        struct ExactInputSingleParams {
            address tokenIn;
            address tokenOut;
            uint24 fee;
            address recipient;
            uint256 deadline;
            uint256 amountIn;
            uint256 amountOutMinimum;
            uint160 sqrtPriceLimitX96;
        }

        function exactInputSingle(ExactInputSingleParams calldata params) external payable returns (uint256 amountOut);
    }
}

sol! {
    /// SwapRouter02 layout: no deadline field in the params struct.
    interface ISwapRouter02 {
        struct ExactInputSingleParams {
            address tokenIn;
            address tokenOut;
            uint24 fee;
            address recipient;
            uint256 amountIn;
            uint256 amountOutMinimum;
            uint160 sqrtPriceLimitX96;
        }

        function exactInputSingle(ExactInputSingleParams calldata params) external payable returns (uint256 amountOut);
    }
}

sol! {
    interface IQuoterV2 {
        struct QuoteExactInputSingleParams {
            address tokenIn;
            address tokenOut;
            uint256 amountIn;
            uint24 fee;
            uint160 sqrtPriceLimitX96;
        }

        function quoteExactInputSingle(QuoteExactInputSingleParams memory params) external returns (uint256 amountOut, uint160 sqrtPriceX96After, uint32 initializedTicksCrossed, uint256 gasEstimate);
    }
}

// ── Multicall3 ───────────────────────────────────────────────────────

sol! {
    interface IMulticall3 {
        struct Call3 {
            address target;
            bool allowFailure;
            bytes callData;
        }

        struct CallReturn {
            bool success;
            bytes returnData;
        }

        function aggregate3(Call3[] calldata calls) external payable returns (CallReturn[] memory returnData);
    }
}

// ── Reserve lens (optional batch reader) ─────────────────────────────

sol! {
    /// Batch reader that fuses per-pair reserve and token0 reads into a
    /// single on-chain call. Deployed on some chains only; plain
    /// multicall is the fallback.
    interface IReserveLens {
        struct PairState {
            uint112 reserve0;
            uint112 reserve1;
            address token0;
        }

        function v2PairStates(address[] calldata pairs) external view returns (PairState[] memory states);
    }
}

// ── Swap executor (atomic multicall dispatcher) ──────────────────────

sol! {
    /// Stateless executor the engine targets. Pulls input funds, grants
    /// scoped approvals, dispatches the inner calls (overwriting 32
    /// bytes at `injectOffset` with its `injectToken` balance when set),
    /// then flushes every listed token back to the caller.
    interface ISwapExecutor {
        struct Pull {
            address token;
            uint256 amount;
        }

        struct Approval {
            address token;
            address spender;
            uint256 amount;
            bool revokeAfter;
        }

        struct Call {
            address target;
            uint256 value;
            bytes data;
            address injectToken;
            uint64 injectOffset;
        }

        function execute(Pull[] calldata pulls, Approval[] calldata approvals, Call[] calldata calls, address[] calldata tokensToFlush) external payable;
    }
}
